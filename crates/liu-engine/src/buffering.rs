//! 缓冲统计: 缓冲阈值初始化、缓冲/下载进度、缓冲状态边沿通知与码率估算.

use std::sync::atomic::Ordering;

use log::{debug, info};

use liu_block::BlockBuffers;
use liu_core::{MediaType, Ticks, ticks};

use crate::event::EngineEvent;
use crate::state::EngineState;

/// 计算比例并保留三位小数, 结果限制在 [0, 1]; 分母为 0 或结果为 NaN 时返回 0
pub(crate) fn progress_ratio(value: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = ((value as f64 / total as f64) * 1000.0).round() / 1000.0;
    if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) }
}

impl EngineState {
    /// 按容器声明码率初始化缓冲阈值
    ///
    /// 声明码率可信时阈值为一秒数据量 (字节), 否则使用固定初始值等待后续估算.
    /// 下载阈值为缓冲阈值乘以流类型对应的倍数.
    pub fn initialize_buffering_statistics(&self, declared_bitrate: u64) {
        let config = &self.config;
        let settled = declared_bitrate > config.min_valid_bitrate;
        let buffer_cache_length = if settled {
            declared_bitrate / 8
        } else {
            config.starting_cache_length
        };
        self.guessed_byte_rate.store(
            if settled { buffer_cache_length } else { 0 },
            Ordering::Release,
        );
        self.byte_rate_settled.store(settled, Ordering::Release);
        self.apply_cache_length(buffer_cache_length);
        self.is_buffering.store(false, Ordering::Release);
        self.buffering_progress.store(0.0);
        self.download_progress.store(0.0);
        debug!(
            "初始化缓冲阈值: 声明码率={}, 缓冲阈值={}, 下载阈值={}",
            declared_bitrate,
            self.buffer_cache_length(),
            self.download_cache_length()
        );
    }

    fn apply_cache_length(&self, buffer_cache_length: u64) {
        let factor = self
            .config
            .cache_factor(self.is_live_stream(), self.is_network_stream());
        self.buffer_cache_length
            .store(buffer_cache_length, Ordering::Release);
        self.download_cache_length
            .store(buffer_cache_length.saturating_mul(factor), Ordering::Release);
    }

    /// 根据数据包队列更新缓冲进度, 并在缓冲状态变化时发出一次通知
    ///
    /// 流已打开 (或正在打开)、未播放结束、还能继续读包且队列低于缓冲阈值时视为缓冲中.
    pub fn update_buffering(
        &self,
        packet_buffer_length: u64,
        packet_buffer_count: u64,
        can_read_more_packets: bool,
    ) {
        self.packet_buffer_length
            .store(packet_buffer_length, Ordering::Release);
        self.packet_buffer_count
            .store(packet_buffer_count, Ordering::Release);

        let buffer_cache_length = self.buffer_cache_length();
        self.buffering_progress
            .store(progress_ratio(packet_buffer_length, buffer_cache_length));
        self.download_progress.store(progress_ratio(
            packet_buffer_length,
            self.download_cache_length(),
        ));

        let now_buffering = !self.has_media_ended()
            && can_read_more_packets
            && (self.is_open() || self.is_opening())
            && packet_buffer_length < buffer_cache_length;
        let was_buffering = self.is_buffering.swap(now_buffering, Ordering::AcqRel);
        match (was_buffering, now_buffering) {
            (false, true) => {
                debug!("开始缓冲: 队列 {} / {}", packet_buffer_length, buffer_cache_length);
                self.emit(EngineEvent::BufferingStarted);
            }
            (true, false) => {
                debug!("结束缓冲: 队列 {} / {}", packet_buffer_length, buffer_cache_length);
                self.emit(EngineEvent::BufferingEnded);
            }
            _ => {}
        }
    }

    /// 用各缓冲区的累计数据估算字节率, 详见 [`EngineState::guess_byte_rate_from`]
    pub fn guess_byte_rate(&self, buffers: &BlockBuffers) -> bool {
        let durations: Vec<_> = buffers
            .iter()
            .map(|b| (b.media_type(), b.lifetime_duration()))
            .collect();
        self.guess_byte_rate_from(buffers.total_bytes_read(), durations)
    }

    /// 没有可信声明码率时估算字节率并重算缓冲阈值
    ///
    /// 每个基础轨道 (音频/视频) 都累计了足够解码时长后才估算,
    /// 字节率 = 安全系数 * 已读字节数 / 最短轨道时长 (秒).
    /// 只估算一次: 之后缓冲区发生淘汰, 样本会偏小. 本次完成估算时返回 `true`.
    pub fn guess_byte_rate_from(
        &self,
        bytes_read: u64,
        track_durations: impl IntoIterator<Item = (MediaType, Ticks)>,
    ) -> bool {
        if self.byte_rate_settled.load(Ordering::Acquire) {
            return false;
        }

        let mut shortest: Option<Ticks> = None;
        for (media_type, duration) in track_durations {
            if !media_type.is_fundamental() {
                continue;
            }
            if duration < self.config.min_guess_duration {
                return false;
            }
            shortest = Some(shortest.map_or(duration, |s| s.min(duration)));
        }
        let Some(shortest) = shortest else {
            return false;
        };

        if self.byte_rate_settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let byte_rate = (self.config.bitrate_guess_margin * bytes_read as f64
            / ticks::to_seconds(shortest))
        .round() as u64;
        self.guessed_byte_rate.store(byte_rate, Ordering::Release);
        self.apply_cache_length(byte_rate);
        info!(
            "估算字节率: {} B/s (已读 {} 字节, 最短轨道 {})",
            byte_rate,
            bytes_read,
            ticks::format(shortest)
        );
        true
    }

    /// 汇总各缓冲区覆盖范围内的码率
    pub fn update_decoding_bitrate(&self, buffers: &BlockBuffers) -> u64 {
        let bitrate = buffers.iter().map(|b| b.range_bitrate()).sum();
        self.decoding_bitrate.store(bitrate, Ordering::Release);
        bitrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StreamProfile;
    use crate::state::tests::engine;
    use liu_core::TICKS_PER_SECOND;

    #[test]
    fn test_progress_ratio() {
        assert_eq!(progress_ratio(0, 0), 0.0);
        assert_eq!(progress_ratio(10, 0), 0.0);
        assert_eq!(progress_ratio(1, 3), 0.333);
        assert_eq!(progress_ratio(2, 3), 0.667);
        assert_eq!(progress_ratio(5, 2), 1.0);
    }

    #[test]
    fn test_初始化_可信码率() {
        let (state, _sink) = engine();
        state.initialize_buffering_statistics(8_000_000);
        assert_eq!(state.buffer_cache_length(), 1_000_000);
        assert_eq!(state.download_cache_length(), 4_000_000);
        assert_eq!(state.guessed_byte_rate(), Some(1_000_000));
    }

    #[test]
    fn test_初始化_低报码率() {
        let (state, _sink) = engine();
        state.complete_open(&StreamProfile {
            is_network: true,
            declared_bitrate: 100_000,
            ..StreamProfile::default()
        });
        assert_eq!(state.buffer_cache_length(), 512 * 1024);
        assert_eq!(state.download_cache_length(), 512 * 1024 * 30);
        assert_eq!(state.guessed_byte_rate(), None);
    }

    #[test]
    fn test_缓冲边沿通知() {
        let (state, sink) = engine();
        state.complete_open(&StreamProfile::default());
        sink.take();
        let threshold = state.buffer_cache_length();

        // 队列从空涨到阈值以上: 开始与结束各通知一次, 中间的重复评估不通知
        for length in [0, threshold / 2, threshold, threshold * 2] {
            state.update_buffering(length, 1, true);
        }
        assert_eq!(
            sink.take(),
            [EngineEvent::BufferingStarted, EngineEvent::BufferingEnded]
        );
        assert!(!state.is_buffering());
        assert_eq!(state.buffering_progress(), 1.0);
        assert_eq!(state.download_progress(), 0.5);
    }

    #[test]
    fn test_不能读包时不缓冲() {
        let (state, sink) = engine();
        state.complete_open(&StreamProfile::default());
        sink.take();
        state.update_buffering(0, 0, true);
        state.update_buffering(0, 0, false);
        state.update_buffering(0, 0, false);
        assert_eq!(
            sink.take(),
            [EngineEvent::BufferingStarted, EngineEvent::BufferingEnded]
        );
    }

    #[test]
    fn test_未打开时不缓冲() {
        let (state, sink) = engine();
        state.initialize_buffering_statistics(0);
        state.update_buffering(0, 0, true);
        assert!(!state.is_buffering());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_零阈值进度为零() {
        let (state, _sink) = engine();
        state.update_buffering(1024, 1, true);
        assert_eq!(state.buffering_progress(), 0.0);
        assert_eq!(state.download_progress(), 0.0);
    }

    #[test]
    fn test_码率估算只执行一次() {
        let (state, _sink) = engine();
        state.complete_open(&StreamProfile::default());
        let two_seconds = 2 * TICKS_PER_SECOND;

        // 音频尚不足一秒
        assert!(!state.guess_byte_rate_from(
            1_000_000,
            [
                (MediaType::Video, two_seconds),
                (MediaType::Audio, TICKS_PER_SECOND / 2)
            ]
        ));
        assert_eq!(state.guessed_byte_rate(), None);

        let tracks = [
            (MediaType::Video, two_seconds),
            (MediaType::Audio, 4 * TICKS_PER_SECOND),
            (MediaType::Subtitle, 0),
        ];
        assert!(state.guess_byte_rate_from(1_000_000, tracks));
        // 1.2 * 1_000_000 / 2s
        assert_eq!(state.guessed_byte_rate(), Some(600_000));
        assert_eq!(state.buffer_cache_length(), 600_000);
        assert_eq!(state.download_cache_length(), 2_400_000);

        assert!(!state.guess_byte_rate_from(1_000_000, tracks));
        assert!(!state.guess_byte_rate_from(9_000_000, tracks));
        assert_eq!(state.buffer_cache_length(), 600_000);
    }

    #[test]
    fn test_已有声明码率时不估算() {
        let (state, _sink) = engine();
        state.initialize_buffering_statistics(8_000_000);
        assert!(!state.guess_byte_rate_from(
            1,
            [(MediaType::Audio, 10 * TICKS_PER_SECOND)]
        ));
        assert_eq!(state.buffer_cache_length(), 1_000_000);
    }

    #[test]
    fn test_无基础轨道不估算() {
        let (state, _sink) = engine();
        assert!(!state.guess_byte_rate_from(
            1_000,
            [(MediaType::Subtitle, 10 * TICKS_PER_SECOND)]
        ));
    }
}
