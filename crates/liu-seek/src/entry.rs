//! 关键帧索引条目.

use std::cmp::Ordering;

use liu_core::{Rational, Ticks};

/// 解码端产出一帧时提供的描述信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyframeDescriptor {
    /// 来源流索引
    pub stream_index: i32,
    /// 流时间基
    pub time_base: Rational,
    /// 开始时间 (tick)
    pub start_time: Ticks,
    /// 原始显示时间戳 (以 time_base 为单位)
    pub presentation_time: i64,
    /// 原始解码时间戳 (以 time_base 为单位)
    pub decoding_time: i64,
    /// 是否为关键帧, 非关键帧不会进入索引
    pub is_keyframe: bool,
}

/// 索引条目, 构造后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeekIndexEntry {
    /// 来源流索引
    pub stream_index: i32,
    /// 流时间基
    pub time_base: Rational,
    /// 开始时间 (tick)
    pub start_time: Ticks,
    /// 原始显示时间戳
    pub presentation_time: i64,
    /// 原始解码时间戳
    pub decoding_time: i64,
}

impl SeekIndexEntry {
    /// 创建条目
    pub const fn new(
        stream_index: i32,
        time_base: Rational,
        start_time: Ticks,
        presentation_time: i64,
        decoding_time: i64,
    ) -> Self {
        Self {
            stream_index,
            time_base,
            start_time,
            presentation_time,
            decoding_time,
        }
    }

    /// 按开始时间比较
    pub fn compare_to(&self, other: &Self) -> Ordering {
        self.start_time.cmp(&other.start_time)
    }
}

impl From<&KeyframeDescriptor> for SeekIndexEntry {
    fn from(frame: &KeyframeDescriptor) -> Self {
        Self::new(
            frame.stream_index,
            frame.time_base,
            frame.start_time,
            frame.presentation_time,
            frame.decoding_time,
        )
    }
}
