//! 引擎通知.
//!
//! 通知在检测到变化的线程上同步发出; 需要投递到 UI 线程时由接收方自行转发.

use std::sync::mpsc::Sender;

use liu_core::Ticks;

use crate::state::MediaState;

/// 引擎通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// 进入缓冲
    BufferingStarted,
    /// 结束缓冲
    BufferingEnded,
    /// 媒体状态变化
    StateChanged { old: MediaState, new: MediaState },
    /// 播放位置变化
    PositionChanged { old: Ticks, new: Ticks },
    /// 播放到达末尾
    MediaEnded,
}

/// 通知接收方
pub trait EventSink: Send + Sync {
    /// 接收一条通知
    fn notify(&self, event: EngineEvent);
}

/// 丢弃所有通知
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn notify(&self, _event: EngineEvent) {}
}

/// 通过通道转发, 接收端已关闭时静默丢弃
impl EventSink for Sender<EngineEvent> {
    fn notify(&self, event: EngineEvent) {
        let _ = self.send(event);
    }
}

/// 把闭包包装为通知接收方
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    fn notify(&self, event: EngineEvent) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_sender_sink() {
        let (tx, rx) = mpsc::channel();
        tx.notify(EngineEvent::BufferingStarted);
        assert_eq!(rx.try_recv().ok(), Some(EngineEvent::BufferingStarted));
        drop(rx);
        // 接收端关闭后不应 panic
        tx.notify(EngineEvent::BufferingEnded);
    }

    #[test]
    fn test_fn_sink() {
        let count = AtomicUsize::new(0);
        let sink = FnSink(|_e: EngineEvent| {
            count.fetch_add(1, Ordering::Relaxed);
        });
        sink.notify(EngineEvent::MediaEnded);
        sink.notify(EngineEvent::MediaEnded);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
