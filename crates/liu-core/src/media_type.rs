//! 媒体类型定义.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 媒体轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaType {
    /// 视频轨道
    Video,
    /// 音频轨道
    Audio,
    /// 字幕轨道
    Subtitle,
}

impl MediaType {
    /// 所有媒体类型, 按主轨道优先级排列
    pub const ALL: [MediaType; 3] = [Self::Video, Self::Audio, Self::Subtitle];

    /// 是否为基础轨道 (音频或视频), 码率估算只统计基础轨道
    pub const fn is_fundamental(self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "视频",
            Self::Audio => "音频",
            Self::Subtitle => "字幕",
        };
        write!(f, "{name}")
    }
}
