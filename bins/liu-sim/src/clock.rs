//! 墙钟模块.
//!
//! 模拟播放的时间参考, 按倍速推进, 独立于解码进度.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use liu_core::{Ticks, ticks};

/// 墙钟 (线程安全)
#[derive(Clone)]
pub struct WallClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    /// 倍速
    speed: f64,
    /// 上次恢复播放的系统时间与当时的位置
    anchor: Mutex<(Instant, Ticks)>,
    /// 是否已暂停
    paused: AtomicBool,
}

impl WallClock {
    /// 创建从 0 开始计时的时钟
    pub fn new(speed: f64) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                speed,
                anchor: Mutex::new((Instant::now(), 0)),
                paused: AtomicBool::new(false),
            }),
        }
    }

    /// 当前位置 (tick)
    pub fn position(&self) -> Ticks {
        let anchor = self
            .inner
            .anchor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let (since, base) = *anchor;
        if self.inner.paused.load(Ordering::Acquire) {
            return base;
        }
        base + ticks::from_seconds(since.elapsed().as_secs_f64() * self.inner.speed)
    }

    /// 暂停或恢复
    pub fn set_paused(&self, paused: bool) {
        let current = self.position();
        let mut anchor = self
            .inner
            .anchor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *anchor = (Instant::now(), current);
        self.inner.paused.store(paused, Ordering::Release);
    }

    /// 是否已暂停
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }
}
