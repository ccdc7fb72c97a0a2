//! 统一的高精度时间单位 (tick).
//!
//! 引擎内部所有开始时间、时长都以 tick 计量, 1 tick = 100 纳秒.

use crate::rational::Rational;

/// tick 计数, 有符号 (起播前的时间可以为负)
pub type Ticks = i64;

/// 每秒 tick 数
pub const TICKS_PER_SECOND: Ticks = 10_000_000;

/// 每毫秒 tick 数
pub const TICKS_PER_MILLISECOND: Ticks = 10_000;

/// 表示"未定义"的原始时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 秒 -> tick (四舍五入)
pub fn from_seconds(seconds: f64) -> Ticks {
    (seconds * TICKS_PER_SECOND as f64).round() as Ticks
}

/// 毫秒 -> tick
pub const fn from_millis(millis: i64) -> Ticks {
    millis * TICKS_PER_MILLISECOND
}

/// tick -> 秒
pub fn to_seconds(ticks: Ticks) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

/// 原始时间戳 -> tick
///
/// 时间戳为 `NOPTS_VALUE` 或时间基无效时返回 `None`.
pub fn from_timestamp(value: i64, time_base: Rational) -> Option<Ticks> {
    if value == NOPTS_VALUE {
        return None;
    }
    time_base.rescale(value, TICKS_PER_SECOND)
}

/// 格式化为 `HH:MM:SS.mmm`, 用于日志输出
pub fn format(ticks: Ticks) -> String {
    let sign = if ticks < 0 { "-" } else { "" };
    let total_ms = ticks.unsigned_abs() / TICKS_PER_MILLISECOND as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{sign}{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_秒互转() {
        assert_eq!(from_seconds(1.5), 15_000_000);
        assert!((to_seconds(25_000_000) - 2.5).abs() < f64::EPSILON);
        assert_eq!(from_millis(40), 400_000);
    }

    #[test]
    fn test_ticks_from_timestamp() {
        let tb = Rational::new(1, 90_000);
        assert_eq!(from_timestamp(90_000, tb), Some(TICKS_PER_SECOND));
        assert_eq!(from_timestamp(NOPTS_VALUE, tb), None);
        assert_eq!(from_timestamp(1, Rational::UNDEFINED), None);
    }

    #[test]
    fn test_ticks_format() {
        assert_eq!(format(from_millis(3_723_045)), "01:02:03.045");
        assert_eq!(format(-from_millis(500)), "-00:00:00.500");
    }
}
