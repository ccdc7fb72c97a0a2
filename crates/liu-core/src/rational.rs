//! 有理数时间基, 用于把流内原始时间戳换算为真实时间.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 例如时间基 1/90000 表示 90kHz 时钟, 1/44100 表示以采样为单位的音频时钟.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 判断是否有效 (分子分母均不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0 && self.num != 0
    }

    /// 转换为 f64 浮点数
    ///
    /// 分母为 0 时返回 `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 把以本时间基计量的 `value` 换算到 `1/units_per_second` 时间单位
    ///
    /// 使用 i128 交叉乘法避免精度损失, 结果溢出 i64 或时间基无效时返回 `None`.
    pub fn rescale(self, value: i64, units_per_second: i64) -> Option<i64> {
        if !self.is_valid() {
            return None;
        }
        let num = i128::from(value) * i128::from(self.num) * i128::from(units_per_second);
        let den = i128::from(self.den);
        i64::try_from(num / den).ok()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self { num, den }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_to_f64() {
        let r = Rational::new(1, 4);
        assert!((r.to_f64() - 0.25).abs() < f64::EPSILON);
        assert!(Rational::UNDEFINED.to_f64().is_nan());
    }

    #[test]
    fn test_rational_rescale_90k() {
        // 90kHz 时钟下 90000 即 1 秒, 换算为毫秒
        let tb = Rational::new(1, 90_000);
        assert_eq!(tb.rescale(90_000, 1_000), Some(1_000));
        assert_eq!(tb.rescale(-45_000, 1_000), Some(-500));
    }

    #[test]
    fn test_rational_rescale_无效时间基() {
        assert_eq!(Rational::UNDEFINED.rescale(10, 1_000), None);
        assert_eq!(Rational::new(1, 0).rescale(10, 1_000), None);
    }

    #[test]
    fn test_rational_rescale_溢出() {
        let tb = Rational::new(i32::MAX, 1);
        assert_eq!(tb.rescale(i64::MAX, 10_000_000), None);
    }

    #[test]
    fn test_rational_display() {
        assert_eq!(format!("{}", Rational::new(30000, 1001)), "30000/1001");
    }
}
