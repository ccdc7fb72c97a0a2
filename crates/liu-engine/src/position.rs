//! 播放位置跟踪.

use std::sync::atomic::Ordering;

use liu_block::BlockBuffer;
use liu_core::Ticks;

use crate::event::EngineEvent;
use crate::state::EngineState;

impl EngineState {
    /// 报告墙钟位置, 值变化时发出一次位置变更通知并返回 `true`
    pub fn report_position(&self, position: Ticks) -> bool {
        let old = self.position.swap(position, Ordering::AcqRel);
        if old == position {
            return false;
        }
        self.emit(EngineEvent::PositionChanged { old, new: position });
        true
    }

    /// 根据主缓冲区更新当前/下一个/上一个位置
    ///
    /// 当前位置取包含 `position` 的块的开始时间. 相邻块存在时取其开始时间,
    /// 处于缓冲区两端时由当前块的结束 (开始) 时间外推半个块时长.
    /// 主缓冲区中找不到块时三者都等于 `position`.
    pub fn update_position(&self, main: &BlockBuffer, position: Ticks) {
        self.report_position(position);

        let Some((block, previous, next)) = main.lookup_with_neighbors(position) else {
            self.position_current.store(position, Ordering::Release);
            self.position_next.store(position, Ordering::Release);
            self.position_previous.store(position, Ordering::Release);
            return;
        };

        let half = block.duration() / 2;
        let next = next.map_or(block.end_time() + half, |b| b.start_time());
        let previous = previous.map_or(block.start_time() - half, |b| b.start_time());

        self.position_current
            .store(block.start_time(), Ordering::Release);
        self.position_next.store(next, Ordering::Release);
        self.position_previous.store(previous, Ordering::Release);
    }
}
