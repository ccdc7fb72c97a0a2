//! 各媒体类型缓冲区的集合与主轨道选择.

use std::collections::BTreeMap;
use std::sync::Arc;

use liu_core::MediaType;

use crate::buffer::BlockBuffer;

/// 选择驱动播放位置的主媒体类型: 有视频取视频, 否则音频, 最后字幕
pub fn main_media_type(media_types: impl IntoIterator<Item = MediaType>) -> Option<MediaType> {
    media_types.into_iter().min_by_key(|t| match t {
        MediaType::Video => 0,
        MediaType::Audio => 1,
        MediaType::Subtitle => 2,
    })
}

/// 一次播放会话中所有轨道的缓冲区
#[derive(Default)]
pub struct BlockBuffers {
    buffers: BTreeMap<MediaType, Arc<BlockBuffer>>,
}

impl BlockBuffers {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入 (或替换) 一个缓冲区, 被替换的缓冲区会先销毁
    pub fn insert(&mut self, buffer: BlockBuffer) -> Arc<BlockBuffer> {
        let buffer = Arc::new(buffer);
        if let Some(old) = self.buffers.insert(buffer.media_type(), Arc::clone(&buffer)) {
            old.dispose();
        }
        buffer
    }

    /// 移除并销毁某类型的缓冲区 (轨道切换时使用)
    pub fn remove(&mut self, media_type: MediaType) -> bool {
        match self.buffers.remove(&media_type) {
            Some(old) => {
                old.dispose();
                true
            }
            None => false,
        }
    }

    /// 按类型获取缓冲区
    pub fn get(&self, media_type: MediaType) -> Option<&Arc<BlockBuffer>> {
        self.buffers.get(&media_type)
    }

    /// 已有的媒体类型
    pub fn media_types(&self) -> impl Iterator<Item = MediaType> + '_ {
        self.buffers.keys().copied()
    }

    /// 遍历所有缓冲区
    pub fn iter(&self) -> impl Iterator<Item = &Arc<BlockBuffer>> {
        self.buffers.values()
    }

    /// 主媒体类型
    pub fn main_media_type(&self) -> Option<MediaType> {
        main_media_type(self.media_types())
    }

    /// 主缓冲区, 作为当前播放位置的唯一依据
    pub fn main_buffer(&self) -> Option<&Arc<BlockBuffer>> {
        self.main_media_type().and_then(|t| self.get(t))
    }

    /// 所有缓冲区累计读取的压缩数据字节数
    pub fn total_bytes_read(&self) -> u64 {
        self.iter().map(|b| b.lifetime_bytes_read()).sum()
    }

    /// 销毁所有缓冲区 (关闭流时调用)
    pub fn dispose_all(&mut self) {
        for buffer in self.buffers.values() {
            buffer.dispose();
        }
        self.buffers.clear();
    }
}
