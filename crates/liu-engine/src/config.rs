//! 引擎配置.
//!
//! 所有字段都有默认值, JSON 中缺省的字段取默认值.

use std::path::Path;

use serde::{Deserialize, Serialize};

use liu_block::{BlockBuffer, BlockBuffers};
use liu_core::{LiuError, LiuResult, MediaType, TICKS_PER_SECOND, Ticks};

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 容器声明码率 (bit/s) 高于此值才视为可信, 部分容器会低报码率
    pub min_valid_bitrate: u64,
    /// 没有可信码率时的初始缓冲阈值 (字节)
    pub starting_cache_length: u64,
    /// 网络/直播流的下载阈值倍数
    pub network_cache_factor: u64,
    /// 本地可跳转流的下载阈值倍数
    pub local_cache_factor: u64,
    /// 码率估算的安全系数
    pub bitrate_guess_margin: f64,
    /// 每个基础轨道至少累计多少解码时长 (tick) 才开始估算码率
    pub min_guess_duration: Ticks,
    /// 视频缓冲区容量 (块)
    pub video_capacity: usize,
    /// 音频缓冲区容量 (块)
    pub audio_capacity: usize,
    /// 字幕缓冲区容量 (块)
    pub subtitle_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_valid_bitrate: 512 * 1024,
            starting_cache_length: 512 * 1024,
            network_cache_factor: 30,
            local_cache_factor: 4,
            bitrate_guess_margin: 1.2,
            min_guess_duration: TICKS_PER_SECOND,
            video_capacity: liu_block::default_capacity(MediaType::Video),
            audio_capacity: liu_block::default_capacity(MediaType::Audio),
            subtitle_capacity: liu_block::default_capacity(MediaType::Subtitle),
        }
    }
}

impl EngineConfig {
    /// 从 JSON 文本解析并校验
    pub fn from_json_str(text: &str) -> LiuResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| LiuError::Config(format!("解析配置失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn from_path(path: impl AsRef<Path>) -> LiuResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// 序列化为 JSON
    pub fn to_json_string(&self) -> LiuResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LiuError::Config(format!("序列化配置失败: {e}")))
    }

    /// 校验取值范围
    pub fn validate(&self) -> LiuResult<()> {
        if self.video_capacity == 0 || self.audio_capacity == 0 || self.subtitle_capacity == 0 {
            return Err(LiuError::Config("缓冲区容量必须大于 0".into()));
        }
        if self.network_cache_factor == 0 || self.local_cache_factor == 0 {
            return Err(LiuError::Config("下载阈值倍数必须大于 0".into()));
        }
        if self.bitrate_guess_margin.is_nan() || self.bitrate_guess_margin < 1.0 {
            return Err(LiuError::Config(format!(
                "码率估算安全系数必须不小于 1, 当前为 {}",
                self.bitrate_guess_margin
            )));
        }
        if self.starting_cache_length == 0 {
            return Err(LiuError::Config("初始缓冲阈值必须大于 0".into()));
        }
        if self.min_guess_duration <= 0 {
            return Err(LiuError::Config("码率估算最小时长必须大于 0".into()));
        }
        Ok(())
    }

    /// 某媒体类型的缓冲区容量
    pub fn capacity_for(&self, media_type: MediaType) -> usize {
        match media_type {
            MediaType::Video => self.video_capacity,
            MediaType::Audio => self.audio_capacity,
            MediaType::Subtitle => self.subtitle_capacity,
        }
    }

    /// 下载阈值倍数: 网络/直播流需要更深的预读来掩盖抖动
    pub fn cache_factor(&self, is_live: bool, is_network: bool) -> u64 {
        if is_live || is_network {
            self.network_cache_factor
        } else {
            self.local_cache_factor
        }
    }

    /// 为给定的轨道类型创建缓冲区集合
    pub fn create_buffers(
        &self,
        media_types: impl IntoIterator<Item = MediaType>,
    ) -> LiuResult<BlockBuffers> {
        let mut buffers = BlockBuffers::new();
        for media_type in media_types {
            buffers.insert(BlockBuffer::new(media_type, self.capacity_for(media_type))?);
        }
        Ok(buffers)
    }
}
