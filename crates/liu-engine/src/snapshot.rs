//! 引擎状态快照与逐字段差异.

use bitflags::bitflags;

use liu_core::Ticks;

use crate::state::MediaState;

bitflags! {
    /// 两次快照之间发生变化的字段
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangedFields: u32 {
        const MEDIA_STATE = 1 << 0;
        const IS_OPEN = 1 << 1;
        const HAS_MEDIA_ENDED = 1 << 2;
        const POSITION = 1 << 3;
        const POSITION_CURRENT = 1 << 4;
        const POSITION_NEXT = 1 << 5;
        const POSITION_PREVIOUS = 1 << 6;
        const IS_BUFFERING = 1 << 7;
        const BUFFERING_PROGRESS = 1 << 8;
        const DOWNLOAD_PROGRESS = 1 << 9;
        const BUFFER_CACHE_LENGTH = 1 << 10;
        const DOWNLOAD_CACHE_LENGTH = 1 << 11;
        const DECODING_BITRATE = 1 << 12;
        const PACKET_BUFFER_LENGTH = 1 << 13;
        const PACKET_BUFFER_COUNT = 1 << 14;
    }
}

/// 引擎状态的值快照, 供状态面板定期比较
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSnapshot {
    pub media_state: MediaState,
    pub is_open: bool,
    pub has_media_ended: bool,
    pub position: Ticks,
    pub position_current: Ticks,
    pub position_next: Ticks,
    pub position_previous: Ticks,
    pub is_buffering: bool,
    pub buffering_progress: f64,
    pub download_progress: f64,
    pub buffer_cache_length: u64,
    pub download_cache_length: u64,
    pub decoding_bitrate: u64,
    pub packet_buffer_length: u64,
    pub packet_buffer_count: u64,
}

impl EngineSnapshot {
    /// 与更早的快照 `previous` 比较, 返回变化的字段
    pub fn diff(&self, previous: &EngineSnapshot) -> ChangedFields {
        let mut changed = ChangedFields::empty();
        let mut mark = |flag: ChangedFields, differs: bool| {
            if differs {
                changed |= flag;
            }
        };
        mark(ChangedFields::MEDIA_STATE, self.media_state != previous.media_state);
        mark(ChangedFields::IS_OPEN, self.is_open != previous.is_open);
        mark(
            ChangedFields::HAS_MEDIA_ENDED,
            self.has_media_ended != previous.has_media_ended,
        );
        mark(ChangedFields::POSITION, self.position != previous.position);
        mark(
            ChangedFields::POSITION_CURRENT,
            self.position_current != previous.position_current,
        );
        mark(
            ChangedFields::POSITION_NEXT,
            self.position_next != previous.position_next,
        );
        mark(
            ChangedFields::POSITION_PREVIOUS,
            self.position_previous != previous.position_previous,
        );
        mark(ChangedFields::IS_BUFFERING, self.is_buffering != previous.is_buffering);
        mark(
            ChangedFields::BUFFERING_PROGRESS,
            self.buffering_progress != previous.buffering_progress,
        );
        mark(
            ChangedFields::DOWNLOAD_PROGRESS,
            self.download_progress != previous.download_progress,
        );
        mark(
            ChangedFields::BUFFER_CACHE_LENGTH,
            self.buffer_cache_length != previous.buffer_cache_length,
        );
        mark(
            ChangedFields::DOWNLOAD_CACHE_LENGTH,
            self.download_cache_length != previous.download_cache_length,
        );
        mark(
            ChangedFields::DECODING_BITRATE,
            self.decoding_bitrate != previous.decoding_bitrate,
        );
        mark(
            ChangedFields::PACKET_BUFFER_LENGTH,
            self.packet_buffer_length != previous.packet_buffer_length,
        );
        mark(
            ChangedFields::PACKET_BUFFER_COUNT,
            self.packet_buffer_count != previous.packet_buffer_count,
        );
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::engine;

    #[test]
    fn test_diff_无变化() {
        let a = EngineSnapshot::default();
        assert!(a.diff(&a.clone()).is_empty());
    }

    #[test]
    fn test_diff_逐字段() {
        let (state, _sink) = engine();
        let before = state.snapshot();
        state.set_media_state(MediaState::Play);
        state.report_position(10);
        let after = state.snapshot();
        assert_eq!(
            after.diff(&before),
            ChangedFields::MEDIA_STATE | ChangedFields::POSITION
        );
    }
}
