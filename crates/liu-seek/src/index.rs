//! 关键帧索引.

use liu_core::Ticks;

use crate::entry::{KeyframeDescriptor, SeekIndexEntry};

/// 单个流的关键帧索引
///
/// 条目按 `start_time` 升序排列, 且 `start_time` 不重复.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekIndex {
    source_url: String,
    stream_index: i32,
    entries: Vec<SeekIndexEntry>,
}

impl SeekIndex {
    /// 创建空索引
    pub fn new(source_url: impl Into<String>, stream_index: i32) -> Self {
        Self {
            source_url: source_url.into(),
            stream_index,
            entries: Vec::new(),
        }
    }

    /// 媒体来源标识 (URL 或文件路径)
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// 流索引
    pub fn stream_index(&self) -> i32 {
        self.stream_index
    }

    /// 所有条目 (按开始时间升序)
    pub fn entries(&self) -> &[SeekIndexEntry] {
        &self.entries
    }

    /// 条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 第一个条目
    pub fn first(&self) -> Option<&SeekIndexEntry> {
        self.entries.first()
    }

    /// 最后一个条目
    pub fn last(&self) -> Option<&SeekIndexEntry> {
        self.entries.last()
    }

    /// 记录一个关键帧
    ///
    /// 非关键帧或开始时间已存在时返回 `false`, 索引不变.
    pub fn try_add(&mut self, frame: &KeyframeDescriptor) -> bool {
        if !frame.is_keyframe {
            return false;
        }
        self.insert(SeekIndexEntry::from(frame))
    }

    /// 插入条目并保持有序, 开始时间重复时返回 `false`
    pub fn insert(&mut self, entry: SeekIndexEntry) -> bool {
        match self
            .entries
            .binary_search_by(|e| e.compare_to(&entry))
        {
            Ok(_) => false,
            Err(position) => {
                self.entries.insert(position, entry);
                true
            }
        }
    }

    /// 查找 `target` 之前 (含) 最近的关键帧, `target` 早于所有条目时返回 `None`
    pub fn find(&self, target: Ticks) -> Option<&SeekIndexEntry> {
        let upper = self.entries.partition_point(|e| e.start_time <= target);
        upper.checked_sub(1).map(|i| &self.entries[i])
    }

    /// 清空条目
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liu_core::Rational;

    fn keyframe(start_time: Ticks) -> KeyframeDescriptor {
        KeyframeDescriptor {
            stream_index: 0,
            time_base: Rational::new(1, 90_000),
            start_time,
            presentation_time: start_time / 111,
            decoding_time: start_time / 111 - 3_000,
            is_keyframe: true,
        }
    }

    #[test]
    fn test_try_add_去重() {
        let mut index = SeekIndex::new("file.mp4", 0);
        assert!(index.try_add(&keyframe(20_000_000)));
        assert!(!index.try_add(&keyframe(20_000_000)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_try_add_忽略非关键帧() {
        let mut index = SeekIndex::new("file.mp4", 0);
        let frame = KeyframeDescriptor {
            is_keyframe: false,
            ..keyframe(0)
        };
        assert!(!index.try_add(&frame));
        assert!(index.is_empty());
    }

    #[test]
    fn test_try_add_保持有序() {
        let mut index = SeekIndex::new("file.mp4", 0);
        for start in [50, 10, 30, 20, 40] {
            index.try_add(&keyframe(start));
        }
        let starts: Vec<_> = index.entries().iter().map(|e| e.start_time).collect();
        assert_eq!(starts, [10, 20, 30, 40, 50]);
        assert_eq!(index.first().map(|e| e.start_time), Some(10));
        assert_eq!(index.last().map(|e| e.start_time), Some(50));
    }

    #[test]
    fn test_find() {
        let mut index = SeekIndex::new("file.mp4", 0);
        for start in [0, 100, 200] {
            index.try_add(&keyframe(start));
        }
        assert_eq!(index.find(150).map(|e| e.start_time), Some(100));
        assert_eq!(index.find(100).map(|e| e.start_time), Some(100));
        assert_eq!(index.find(999).map(|e| e.start_time), Some(200));
        assert!(index.find(-1).is_none());
        assert!(SeekIndex::new("", 0).find(0).is_none());
    }
}
