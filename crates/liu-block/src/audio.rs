//! 音频块元数据与填充.

use liu_core::{LiuError, LiuResult, TICKS_PER_SECOND};

use crate::block::{Block, BlockKind, BlockTiming};

/// 音频块: 一段交错 PCM 采样
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBlock {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channel_count: u32,
    /// 每声道采样数
    pub samples_per_channel: u32,
    /// 有效采样数据长度 (字节), 不超过块内存长度
    pub samples_buffer_length: usize,
}

impl AudioBlock {
    /// 创建音频元数据, `samples_buffer_length` 在填充时按负载长度设置
    pub fn new(sample_rate: u32, channel_count: u32, samples_per_channel: u32) -> Self {
        Self {
            sample_rate,
            channel_count,
            samples_per_channel,
            samples_buffer_length: 0,
        }
    }

    /// 由采样数推算的时长 (tick), 采样率为 0 时返回 0
    pub fn sample_duration(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        i64::from(self.samples_per_channel) * TICKS_PER_SECOND / i64::from(self.sample_rate)
    }
}

impl Block {
    /// 用解码后的 PCM 采样填充音频块
    ///
    /// `timing.duration` 为 0 时按采样数推算时长.
    pub fn fill_audio(
        &self,
        mut timing: BlockTiming,
        samples: &[u8],
        mut audio: AudioBlock,
    ) -> LiuResult<()> {
        if audio.channel_count == 0 {
            return Err(LiuError::InvalidArgument("声道数不能为 0".into()));
        }
        if timing.duration == 0 {
            timing.duration = audio.sample_duration();
        }
        audio.samples_buffer_length = samples.len();
        self.fill(timing, samples, BlockKind::Audio(audio))
    }
}
