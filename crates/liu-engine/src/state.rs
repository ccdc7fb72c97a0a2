//! 引擎状态字段与媒体状态机.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};

use log::info;

use liu_core::Ticks;

use crate::atomic::AtomicF64;
use crate::config::EngineConfig;
use crate::event::{EngineEvent, EventSink};
use crate::snapshot::EngineSnapshot;

/// 媒体状态
///
/// 本组件不校验状态转换是否合法, 合法性由上层命令负责.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MediaState {
    /// 已关闭
    #[default]
    Close = 0,
    /// 手动逐帧
    Manual = 1,
    /// 播放中
    Play = 2,
    /// 已暂停
    Pause = 3,
    /// 已停止
    Stop = 4,
}

impl MediaState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Manual,
            2 => Self::Play,
            3 => Self::Pause,
            4 => Self::Stop,
            _ => Self::Close,
        }
    }
}

impl fmt::Display for MediaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Close => "关闭",
            Self::Manual => "手动",
            Self::Play => "播放",
            Self::Pause => "暂停",
            Self::Stop => "停止",
        };
        write!(f, "{name}")
    }
}

/// 打开流时由解封装端提供的流特征
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamProfile {
    /// 直播流
    pub is_live: bool,
    /// 网络流
    pub is_network: bool,
    /// 可跳转
    pub is_seekable: bool,
    /// 容器声明的码率 (bit/s), 0 表示未知
    pub declared_bitrate: u64,
    /// 媒体总时长, 直播流为 `None`
    pub natural_duration: Option<Ticks>,
}

/// 播放引擎状态 (线程安全)
///
/// 每个字段独立原子更新; 通知在检测到变化的线程上同步发出, 每次变化只发一次.
pub struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) sink: Arc<dyn EventSink>,

    pub(crate) media_state: AtomicU8,
    pub(crate) is_open: AtomicBool,
    pub(crate) is_opening: AtomicBool,
    pub(crate) has_media_ended: AtomicBool,
    pub(crate) is_seekable: AtomicBool,
    pub(crate) is_live_stream: AtomicBool,
    pub(crate) is_network_stream: AtomicBool,
    /// 负值表示未知
    pub(crate) natural_duration: AtomicI64,

    pub(crate) position: AtomicI64,
    pub(crate) position_current: AtomicI64,
    pub(crate) position_next: AtomicI64,
    pub(crate) position_previous: AtomicI64,

    pub(crate) is_buffering: AtomicBool,
    pub(crate) buffering_progress: AtomicF64,
    pub(crate) download_progress: AtomicF64,
    pub(crate) buffer_cache_length: AtomicU64,
    pub(crate) download_cache_length: AtomicU64,
    pub(crate) packet_buffer_length: AtomicU64,
    pub(crate) packet_buffer_count: AtomicU64,

    pub(crate) decoding_bitrate: AtomicU64,
    /// 估算 (或声明) 的字节率, 0 表示尚未确定
    pub(crate) guessed_byte_rate: AtomicU64,
    pub(crate) byte_rate_settled: AtomicBool,
}

impl EngineState {
    /// 创建处于关闭状态的引擎
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            sink,
            media_state: AtomicU8::new(MediaState::Close as u8),
            is_open: AtomicBool::new(false),
            is_opening: AtomicBool::new(false),
            has_media_ended: AtomicBool::new(false),
            is_seekable: AtomicBool::new(false),
            is_live_stream: AtomicBool::new(false),
            is_network_stream: AtomicBool::new(false),
            natural_duration: AtomicI64::new(-1),
            position: AtomicI64::new(0),
            position_current: AtomicI64::new(0),
            position_next: AtomicI64::new(0),
            position_previous: AtomicI64::new(0),
            is_buffering: AtomicBool::new(false),
            buffering_progress: AtomicF64::default(),
            download_progress: AtomicF64::default(),
            buffer_cache_length: AtomicU64::new(0),
            download_cache_length: AtomicU64::new(0),
            packet_buffer_length: AtomicU64::new(0),
            packet_buffer_count: AtomicU64::new(0),
            decoding_bitrate: AtomicU64::new(0),
            guessed_byte_rate: AtomicU64::new(0),
            byte_rate_settled: AtomicBool::new(false),
        }
    }

    /// 引擎配置
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        self.sink.notify(event);
    }

    // ========================
    // 生命周期
    // ========================

    /// 标记正在打开
    pub fn begin_open(&self) {
        self.is_opening.store(true, Ordering::Release);
    }

    /// 打开完成: 记录流特征, 初始化缓冲阈值, 进入停止状态
    pub fn complete_open(&self, profile: &StreamProfile) {
        self.is_live_stream.store(profile.is_live, Ordering::Release);
        self.is_network_stream
            .store(profile.is_network, Ordering::Release);
        self.is_seekable.store(profile.is_seekable, Ordering::Release);
        self.natural_duration
            .store(profile.natural_duration.unwrap_or(-1), Ordering::Release);
        self.has_media_ended.store(false, Ordering::Release);
        self.initialize_buffering_statistics(profile.declared_bitrate);
        self.is_open.store(true, Ordering::Release);
        self.is_opening.store(false, Ordering::Release);
        self.set_media_state(MediaState::Stop);
    }

    /// 关闭: 所有字段恢复默认值
    ///
    /// 正在缓冲时补发一次结束缓冲通知, 状态变为 `Close` 时发出状态变更通知.
    pub fn reset(&self) {
        if self.is_buffering.swap(false, Ordering::AcqRel) {
            self.emit(EngineEvent::BufferingEnded);
        }
        self.is_open.store(false, Ordering::Release);
        self.is_opening.store(false, Ordering::Release);
        self.has_media_ended.store(false, Ordering::Release);
        self.is_seekable.store(false, Ordering::Release);
        self.is_live_stream.store(false, Ordering::Release);
        self.is_network_stream.store(false, Ordering::Release);
        self.natural_duration.store(-1, Ordering::Release);
        self.position.store(0, Ordering::Release);
        self.position_current.store(0, Ordering::Release);
        self.position_next.store(0, Ordering::Release);
        self.position_previous.store(0, Ordering::Release);
        self.buffering_progress.store(0.0);
        self.download_progress.store(0.0);
        self.buffer_cache_length.store(0, Ordering::Release);
        self.download_cache_length.store(0, Ordering::Release);
        self.packet_buffer_length.store(0, Ordering::Release);
        self.packet_buffer_count.store(0, Ordering::Release);
        self.decoding_bitrate.store(0, Ordering::Release);
        self.guessed_byte_rate.store(0, Ordering::Release);
        self.byte_rate_settled.store(false, Ordering::Release);
        self.set_media_state(MediaState::Close);
    }

    // ========================
    // 媒体状态
    // ========================

    /// 当前媒体状态
    pub fn media_state(&self) -> MediaState {
        MediaState::from_u8(self.media_state.load(Ordering::Acquire))
    }

    /// 设置媒体状态, 值变化时发出一次通知并返回 `true`
    pub fn set_media_state(&self, new: MediaState) -> bool {
        let old = MediaState::from_u8(self.media_state.swap(new as u8, Ordering::AcqRel));
        if old == new {
            return false;
        }
        info!("媒体状态: {} -> {}", old, new);
        self.emit(EngineEvent::StateChanged { old, new });
        true
    }

    /// 标记播放到达末尾, 从未结束变为结束时发出一次通知
    pub fn set_media_ended(&self, ended: bool) {
        let was = self.has_media_ended.swap(ended, Ordering::AcqRel);
        if ended && !was {
            info!("播放结束");
            self.emit(EngineEvent::MediaEnded);
        }
    }

    // ========================
    // 只读字段
    // ========================

    /// 流已打开
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    /// 正在打开
    pub fn is_opening(&self) -> bool {
        self.is_opening.load(Ordering::Acquire)
    }

    /// 已播放到末尾
    pub fn has_media_ended(&self) -> bool {
        self.has_media_ended.load(Ordering::Acquire)
    }

    /// 可跳转
    pub fn is_seekable(&self) -> bool {
        self.is_seekable.load(Ordering::Acquire)
    }

    /// 直播流
    pub fn is_live_stream(&self) -> bool {
        self.is_live_stream.load(Ordering::Acquire)
    }

    /// 网络流
    pub fn is_network_stream(&self) -> bool {
        self.is_network_stream.load(Ordering::Acquire)
    }

    /// 媒体总时长
    pub fn natural_duration(&self) -> Option<Ticks> {
        let value = self.natural_duration.load(Ordering::Acquire);
        (value >= 0).then_some(value)
    }

    /// 当前播放位置
    pub fn position(&self) -> Ticks {
        self.position.load(Ordering::Acquire)
    }

    /// 当前块的开始时间
    pub fn position_current(&self) -> Ticks {
        self.position_current.load(Ordering::Acquire)
    }

    /// 下一个块的开始时间
    pub fn position_next(&self) -> Ticks {
        self.position_next.load(Ordering::Acquire)
    }

    /// 上一个块的开始时间
    pub fn position_previous(&self) -> Ticks {
        self.position_previous.load(Ordering::Acquire)
    }

    /// 是否正在缓冲
    pub fn is_buffering(&self) -> bool {
        self.is_buffering.load(Ordering::Acquire)
    }

    /// 缓冲进度 [0, 1]
    pub fn buffering_progress(&self) -> f64 {
        self.buffering_progress.load()
    }

    /// 下载进度 [0, 1]
    pub fn download_progress(&self) -> f64 {
        self.download_progress.load()
    }

    /// 缓冲阈值 (字节)
    pub fn buffer_cache_length(&self) -> u64 {
        self.buffer_cache_length.load(Ordering::Acquire)
    }

    /// 下载阈值 (字节)
    pub fn download_cache_length(&self) -> u64 {
        self.download_cache_length.load(Ordering::Acquire)
    }

    /// 数据包队列字节数
    pub fn packet_buffer_length(&self) -> u64 {
        self.packet_buffer_length.load(Ordering::Acquire)
    }

    /// 数据包队列包数
    pub fn packet_buffer_count(&self) -> u64 {
        self.packet_buffer_count.load(Ordering::Acquire)
    }

    /// 解码码率 (bit/s)
    pub fn decoding_bitrate(&self) -> u64 {
        self.decoding_bitrate.load(Ordering::Acquire)
    }

    /// 声明或估算的字节率, 尚未确定时为 `None`
    pub fn guessed_byte_rate(&self) -> Option<u64> {
        self.byte_rate_settled
            .load(Ordering::Acquire)
            .then(|| self.guessed_byte_rate.load(Ordering::Acquire))
    }

    /// 所有字段的快照 (字段间不保证一致)
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            media_state: self.media_state(),
            is_open: self.is_open(),
            has_media_ended: self.has_media_ended(),
            position: self.position(),
            position_current: self.position_current(),
            position_next: self.position_next(),
            position_previous: self.position_previous(),
            is_buffering: self.is_buffering(),
            buffering_progress: self.buffering_progress(),
            download_progress: self.download_progress(),
            buffer_cache_length: self.buffer_cache_length(),
            download_cache_length: self.download_cache_length(),
            decoding_bitrate: self.decoding_bitrate(),
            packet_buffer_length: self.packet_buffer_length(),
            packet_buffer_count: self.packet_buffer_count(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 记录所有通知, 供各模块测试共用
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<EngineEvent>>,
    }

    impl RecordingSink {
        pub(crate) fn take(&self) -> Vec<EngineEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl EventSink for RecordingSink {
        fn notify(&self, event: EngineEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    pub(crate) fn engine() -> (EngineState, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let state = EngineState::new(EngineConfig::default(), sink.clone());
        (state, sink)
    }

    #[test]
    fn test_set_media_state_只通知一次() {
        let (state, sink) = engine();
        assert!(state.set_media_state(MediaState::Play));
        assert!(!state.set_media_state(MediaState::Play));
        assert!(state.set_media_state(MediaState::Pause));
        assert_eq!(
            sink.take(),
            [
                EngineEvent::StateChanged {
                    old: MediaState::Close,
                    new: MediaState::Play
                },
                EngineEvent::StateChanged {
                    old: MediaState::Play,
                    new: MediaState::Pause
                },
            ]
        );
    }

    #[test]
    fn test_任意状态可互相切换() {
        let (state, _sink) = engine();
        for s in [
            MediaState::Stop,
            MediaState::Manual,
            MediaState::Close,
            MediaState::Pause,
        ] {
            state.set_media_state(s);
            assert_eq!(state.media_state(), s);
        }
    }

    #[test]
    fn test_open_与_reset() {
        let (state, sink) = engine();
        state.begin_open();
        assert!(state.is_opening());
        state.complete_open(&StreamProfile {
            is_seekable: true,
            natural_duration: Some(600_000_000),
            ..StreamProfile::default()
        });
        assert!(state.is_open());
        assert!(!state.is_opening());
        assert!(state.is_seekable());
        assert_eq!(state.natural_duration(), Some(600_000_000));
        assert_eq!(state.media_state(), MediaState::Stop);
        assert_eq!(state.buffer_cache_length(), 512 * 1024);

        state.is_buffering.store(true, Ordering::Release);
        sink.take();
        state.reset();
        assert!(!state.is_open());
        assert_eq!(state.natural_duration(), None);
        assert_eq!(state.buffer_cache_length(), 0);
        assert_eq!(state.media_state(), MediaState::Close);
        assert_eq!(
            sink.take(),
            [
                EngineEvent::BufferingEnded,
                EngineEvent::StateChanged {
                    old: MediaState::Stop,
                    new: MediaState::Close
                },
            ]
        );
    }

    #[test]
    fn test_media_ended_只通知一次() {
        let (state, sink) = engine();
        state.set_media_ended(true);
        state.set_media_ended(true);
        state.set_media_ended(false);
        assert_eq!(sink.take(), [EngineEvent::MediaEnded]);
        assert!(!state.has_media_ended());
    }
}
