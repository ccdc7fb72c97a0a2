//! 按开始时间排序、容量受限的块缓冲区.
//!
//! 每种媒体类型一个缓冲区. 缓冲区满时淘汰开始时间最早的块并放回槽位池,
//! 槽位池中的块保留已分配的内存, 供下一次 [`BlockBuffer::rent`] 复用.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, trace};

use liu_core::{LiuError, LiuResult, MediaType, TICKS_PER_SECOND, Ticks};

use crate::block::Block;

/// 二分查找之后, 向前线性检查的最大块数 (处理推算时间戳造成的小间隙和重叠)
const LOOKUP_SCAN_WINDOW: usize = 4;

/// 各媒体类型的默认容量, 视频块体积大, 容量更小
pub const fn default_capacity(media_type: MediaType) -> usize {
    match media_type {
        MediaType::Video => 12,
        MediaType::Audio => 120,
        MediaType::Subtitle => 48,
    }
}

#[derive(Default)]
struct BufferInner {
    /// 按开始时间升序排列的播放块
    playback: Vec<Arc<Block>>,
    /// 可复用的槽位
    pool: VecDeque<Arc<Block>>,
    lifetime_count: u64,
    lifetime_duration: Ticks,
    lifetime_bytes_read: u64,
}

impl BufferInner {
    /// 二分定位最后一个 `start_time <= t` 的块, 再向前检查少量相邻块,
    /// 优先返回真正包含 `t` 的块, 否则返回最近的前一个块
    fn index_of(&self, t: Ticks) -> Option<usize> {
        let upper = self.playback.partition_point(|b| b.start_time() <= t);
        if upper == 0 {
            return None;
        }
        let last = upper - 1;
        let floor = last.saturating_sub(LOOKUP_SCAN_WINDOW);
        (floor..=last)
            .rev()
            .find(|&i| self.playback[i].contains(t))
            .or(Some(last))
    }

    /// 按指针身份定位块
    fn position_of(&self, block: &Block) -> Option<usize> {
        let start = block.start_time();
        let lower = self.playback.partition_point(|b| b.start_time() < start);
        self.playback[lower..]
            .iter()
            .take_while(|b| b.start_time() == start)
            .position(|b| std::ptr::eq(b.as_ref(), block))
            .map(|offset| lower + offset)
    }

    fn neighbors_at(&self, index: usize) -> (Option<Arc<Block>>, Option<Arc<Block>>) {
        let previous = index
            .checked_sub(1)
            .map(|i| Arc::clone(&self.playback[i]));
        let next = self.playback.get(index + 1).map(Arc::clone);
        (previous, next)
    }

    fn range_duration(&self) -> Ticks {
        match (self.playback.first(), self.playback.last()) {
            (Some(first), Some(last)) => (last.end_time() - first.start_time()).max(0),
            _ => 0,
        }
    }
}

/// 单一媒体类型的块缓冲区 (线程安全)
///
/// 所有修改与查询都在缓冲区级读写锁内完成, 读者看到的块序列总是有序的.
pub struct BlockBuffer {
    media_type: MediaType,
    capacity: usize,
    inner: RwLock<BufferInner>,
}

impl BlockBuffer {
    /// 创建缓冲区, 容量必须大于 0
    pub fn new(media_type: MediaType, capacity: usize) -> LiuResult<Self> {
        if capacity == 0 {
            return Err(LiuError::InvalidArgument(format!(
                "{media_type}缓冲区容量必须大于 0"
            )));
        }
        Ok(Self {
            media_type,
            capacity,
            inner: RwLock::new(BufferInner::default()),
        })
    }

    /// 以默认容量创建缓冲区
    pub fn with_default_capacity(media_type: MediaType) -> Self {
        Self {
            media_type,
            capacity: default_capacity(media_type),
            inner: RwLock::new(BufferInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 媒体类型
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// 最大块数
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前块数
    pub fn count(&self) -> usize {
        self.read().playback.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.read().playback.is_empty()
    }

    /// 是否已满
    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    /// 已用容量比例 [0, 1]
    pub fn capacity_percent(&self) -> f64 {
        self.count() as f64 / self.capacity as f64
    }

    /// 槽位池中可复用的块数
    pub fn pool_count(&self) -> usize {
        self.read().pool.len()
    }

    /// 租用一个槽位: 优先复用池中的块, 池为空时新建未分配的块
    pub fn rent(&self) -> Arc<Block> {
        let mut inner = self.write();
        while let Some(block) = inner.pool.pop_front() {
            if !block.is_released() {
                return block;
            }
        }
        debug!("{}缓冲区槽位池为空, 新建块", self.media_type);
        Arc::new(Block::new(self.media_type))
    }

    /// 按开始时间插入块
    ///
    /// 缓冲区已满时先把开始时间最早的块放回槽位池. 块类型不符、已释放、
    /// 时长为负或已在缓冲区中时返回 `InvalidBlock`, 块正被填充时返回 `BlockBusy`,
    /// 两种情况下缓冲区都保持不变.
    ///
    /// 块在播放序列中期间不能重新填充, 被淘汰或清空后才可复用.
    pub fn add(&self, block: Arc<Block>) -> LiuResult<()> {
        if block.media_type() != self.media_type {
            return Err(LiuError::InvalidBlock(format!(
                "{}块不能加入{}缓冲区",
                block.media_type(),
                self.media_type
            )));
        }
        let mut inner = self.write();
        // 读守卫期间块不会被填充, 检查与置位之间开始时间不变
        let Some(guard) = block.acquire_read() else {
            return Err(if block.is_released() {
                LiuError::InvalidBlock("块已释放".into())
            } else {
                LiuError::BlockBusy
            });
        };
        let (start, duration) = (block.start_time(), block.duration());
        if duration < 0 {
            return Err(LiuError::InvalidBlock(format!("时长不能为负: {duration}")));
        }
        if block.mark_in_buffer(true) {
            return Err(LiuError::InvalidBlock("块已在缓冲区中".into()));
        }
        drop(guard);

        if inner.playback.len() >= self.capacity {
            let evicted = inner.playback.remove(0);
            evicted.mark_in_buffer(false);
            trace!(
                "{}缓冲区已满, 淘汰 start_time={}",
                self.media_type,
                evicted.start_time()
            );
            inner.pool.push_back(evicted);
        }

        inner.lifetime_count += 1;
        inner.lifetime_duration += duration;
        inner.lifetime_bytes_read += block.compressed_size();

        let index = inner.playback.partition_point(|b| b.start_time() <= start);
        inner.playback.insert(index, block);
        Ok(())
    }

    /// 查找时间点 `t` 对应的块
    ///
    /// 返回包含 `t` 的块; `t` 落在间隙中时返回前一个块;
    /// 缓冲区为空或 `t` 早于第一个块时返回 `None`.
    pub fn lookup(&self, t: Ticks) -> Option<Arc<Block>> {
        let inner = self.read();
        inner.index_of(t).map(|i| Arc::clone(&inner.playback[i]))
    }

    /// 在同一次加锁内查找 `t` 对应的块及其前后相邻块
    ///
    /// 分开调用 [`lookup`](Self::lookup) 和 [`neighbors`](Self::neighbors) 时,
    /// 两次加锁之间的淘汰可能使相邻块丢失.
    pub fn lookup_with_neighbors(
        &self,
        t: Ticks,
    ) -> Option<(Arc<Block>, Option<Arc<Block>>, Option<Arc<Block>>)> {
        let inner = self.read();
        let index = inner.index_of(t)?;
        let (previous, next) = inner.neighbors_at(index);
        Some((Arc::clone(&inner.playback[index]), previous, next))
    }

    /// 时间点 `t` 对应块的下标
    pub fn index_of(&self, t: Ticks) -> Option<usize> {
        self.read().index_of(t)
    }

    /// 相邻块: (前一个, 后一个), 块不在缓冲区中时均为 `None`
    pub fn neighbors(&self, block: &Block) -> (Option<Arc<Block>>, Option<Arc<Block>>) {
        let inner = self.read();
        match inner.position_of(block) {
            Some(index) => inner.neighbors_at(index),
            None => (None, None),
        }
    }

    /// 前一个块
    pub fn previous(&self, block: &Block) -> Option<Arc<Block>> {
        self.neighbors(block).0
    }

    /// 后一个块
    pub fn next(&self, block: &Block) -> Option<Arc<Block>> {
        self.neighbors(block).1
    }

    /// 连续的后一个块: 开始时间与 `block` 结束时间相差不超过半个块时长
    pub fn continuous_next(&self, block: &Block) -> Option<Arc<Block>> {
        let next = self.next(block)?;
        let tolerance = block.duration() / 2;
        let gap = (next.start_time() - block.end_time()).abs();
        (gap <= tolerance).then_some(next)
    }

    /// 当前块的快照 (按开始时间排序)
    pub fn blocks(&self) -> Vec<Arc<Block>> {
        self.read().playback.clone()
    }

    /// 当前块的开始时间序列
    pub fn start_times(&self) -> Vec<Ticks> {
        self.read().playback.iter().map(|b| b.start_time()).collect()
    }

    /// 第一个块的开始时间, 空缓冲区为 0
    pub fn range_start_time(&self) -> Ticks {
        self.read().playback.first().map_or(0, |b| b.start_time())
    }

    /// 最后一个块的结束时间, 空缓冲区为 0
    pub fn range_end_time(&self) -> Ticks {
        self.read().playback.last().map_or(0, |b| b.end_time())
    }

    /// 缓冲覆盖的时长
    pub fn range_duration(&self) -> Ticks {
        self.read().range_duration()
    }

    /// 平均块时长, 空缓冲区为 0
    pub fn average_block_duration(&self) -> Ticks {
        let inner = self.read();
        if inner.playback.is_empty() {
            return 0;
        }
        let total: Ticks = inner.playback.iter().map(|b| b.duration()).sum();
        total / inner.playback.len() as Ticks
    }

    /// 所有块时长是否一致
    pub fn is_monotonic(&self) -> bool {
        let inner = self.read();
        let Some(first) = inner.playback.first() else {
            return false;
        };
        let duration = first.duration();
        inner.playback.iter().all(|b| b.duration() == duration)
    }

    /// `t` 是否落在缓冲覆盖范围内
    pub fn is_in_range(&self, t: Ticks) -> bool {
        let inner = self.read();
        match (inner.playback.first(), inner.playback.last()) {
            (Some(first), Some(last)) => first.start_time() <= t && t <= last.end_time(),
            _ => false,
        }
    }

    /// `t` 在缓冲覆盖范围内的相对位置 [0, 1]
    pub fn range_percent(&self, t: Ticks) -> f64 {
        let inner = self.read();
        let duration = inner.range_duration();
        let Some(first) = inner.playback.first() else {
            return 0.0;
        };
        if duration <= 0 {
            return 0.0;
        }
        ((t - first.start_time()) as f64 / duration as f64).clamp(0.0, 1.0)
    }

    /// 缓冲覆盖范围内压缩数据的码率 (bit/s)
    pub fn range_bitrate(&self) -> u64 {
        let inner = self.read();
        let duration = inner.range_duration();
        if duration <= 0 {
            return 0;
        }
        let bytes: u64 = inner.playback.iter().map(|b| b.compressed_size()).sum();
        (bytes as f64 * 8.0 * TICKS_PER_SECOND as f64 / duration as f64) as u64
    }

    /// 累计加入过的块数 (不受淘汰影响)
    pub fn lifetime_count(&self) -> u64 {
        self.read().lifetime_count
    }

    /// 累计加入过的块时长之和
    pub fn lifetime_duration(&self) -> Ticks {
        self.read().lifetime_duration
    }

    /// 累计读取的压缩数据字节数
    pub fn lifetime_bytes_read(&self) -> u64 {
        self.read().lifetime_bytes_read
    }

    /// 清空播放块 (放回槽位池), 用于跳转后重新填充
    pub fn clear(&self) {
        let mut inner = self.write();
        let blocks = std::mem::take(&mut inner.playback);
        debug!("{}缓冲区清空, 回收 {} 个块", self.media_type, blocks.len());
        for block in &blocks {
            block.mark_in_buffer(false);
        }
        inner.pool.extend(blocks);
    }

    /// 释放全部块 (播放块与池中槽位), 并重置累计计数
    pub fn dispose(&self) {
        let mut inner = self.write();
        let mut blocks = std::mem::take(&mut inner.playback);
        blocks.extend(inner.pool.drain(..));
        let released = blocks
            .iter()
            .filter(|b| {
                b.mark_in_buffer(false);
                b.release()
            })
            .count();
        inner.lifetime_count = 0;
        inner.lifetime_duration = 0;
        inner.lifetime_bytes_read = 0;
        debug!("{}缓冲区销毁, 释放 {} 个块", self.media_type, released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBlock;
    use crate::block::BlockTiming;

    fn filled(buffer: &BlockBuffer, start: Ticks, duration: Ticks) -> Arc<Block> {
        let block = buffer.rent();
        let timing = BlockTiming {
            start_time: start,
            duration,
            stream_index: 0,
            compressed_size: 100,
            ..BlockTiming::default()
        };
        block
            .fill_audio(timing, &[0u8; 8], AudioBlock::new(48_000, 2, 2))
            .expect("填充");
        block
    }

    fn three_blocks() -> BlockBuffer {
        let buffer = BlockBuffer::new(MediaType::Audio, 8).expect("缓冲区");
        for start in [20, 0, 10] {
            buffer.add(filled(&buffer, start, 10)).expect("加入");
        }
        buffer
    }

    #[test]
    fn test_new_容量为零() {
        assert!(BlockBuffer::new(MediaType::Video, 0).is_err());
    }

    #[test]
    fn test_add_保持有序() {
        let buffer = three_blocks();
        assert_eq!(buffer.start_times(), [0, 10, 20]);
    }

    #[test]
    fn test_add_满时淘汰最早块() {
        let buffer = BlockBuffer::new(MediaType::Audio, 3).expect("缓冲区");
        for start in [0, 10, 20, 30] {
            buffer.add(filled(&buffer, start, 10)).expect("加入");
        }
        assert_eq!(buffer.start_times(), [10, 20, 30]);
        assert_eq!(buffer.pool_count(), 1);
        assert_eq!(buffer.lifetime_count(), 4);
        assert_eq!(buffer.lifetime_duration(), 40);
        assert_eq!(buffer.lifetime_bytes_read(), 400);

        // 下一次租用复用被淘汰的槽位
        let reused = buffer.rent();
        assert_eq!(reused.start_time(), 0);
        assert!(reused.is_allocated());
        assert_eq!(buffer.pool_count(), 0);
    }

    #[test]
    fn test_add_无效块() {
        let buffer = BlockBuffer::new(MediaType::Audio, 3).expect("缓冲区");
        let video = Arc::new(Block::new(MediaType::Video));
        assert!(matches!(buffer.add(video), Err(LiuError::InvalidBlock(_))));

        let released = filled(&buffer, 0, 10);
        released.release();
        assert!(matches!(buffer.add(released), Err(LiuError::InvalidBlock(_))));

        let block = filled(&buffer, 0, 10);
        buffer.add(Arc::clone(&block)).expect("加入");
        assert!(matches!(buffer.add(block), Err(LiuError::InvalidBlock(_))));
        assert_eq!(buffer.count(), 1);
    }

    #[test]
    fn test_add_满缓冲区乱序插入始终有序() {
        let buffer = BlockBuffer::new(MediaType::Audio, 16).expect("缓冲区");
        // 0..100 的固定乱序排列 (37 与 100 互素)
        for start in (0..100).map(|i| (i * 37 % 100) * 10) {
            buffer.add(filled(&buffer, start, 10)).expect("加入");
            let starts = buffer.start_times();
            assert!(starts.len() <= buffer.capacity());
            assert!(starts.windows(2).all(|w| w[0] <= w[1]), "乱序: {starts:?}");
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.lifetime_count(), 100);
        // 块加入后不能改写, 缓冲区里的每个块都标记在序列中
        assert!(buffer.blocks().iter().all(|b| b.is_in_buffer()));
        assert!(buffer.pool_count() <= 1);
    }

    #[test]
    fn test_add_后重填被拒绝() {
        let buffer = three_blocks();
        let block = buffer.lookup(5).expect("块");
        let refill = block.fill_audio(
            BlockTiming {
                start_time: 100,
                duration: 10,
                ..BlockTiming::default()
            },
            &[0u8; 8],
            AudioBlock::new(48_000, 2, 2),
        );
        assert!(matches!(refill, Err(LiuError::InvalidBlock(_))));
        assert_eq!(buffer.start_times(), [0, 10, 20]);

        // 淘汰回池后可以复用
        buffer.clear();
        assert!(!block.is_in_buffer());
        let reused = buffer.rent();
        assert!(reused.fill_audio(
            BlockTiming {
                start_time: 100,
                duration: 10,
                ..BlockTiming::default()
            },
            &[0u8; 8],
            AudioBlock::new(48_000, 2, 2),
        )
        .is_ok());
    }

    #[test]
    fn test_add_填充中返回忙() {
        let buffer = BlockBuffer::new(MediaType::Audio, 4).expect("缓冲区");
        let block = filled(&buffer, 0, 10);
        let writer = block.acquire_write().expect("写守卫");
        assert!(matches!(buffer.add(Arc::clone(&block)), Err(LiuError::BlockBusy)));
        drop(writer);
        buffer.add(block).expect("加入");
        assert_eq!(buffer.count(), 1);
    }

    #[test]
    fn test_lookup_with_neighbors() {
        let buffer = three_blocks();
        let (block, previous, next) = buffer.lookup_with_neighbors(15).expect("块");
        assert_eq!(block.start_time(), 10);
        assert_eq!(previous.map(|b| b.start_time()), Some(0));
        assert_eq!(next.map(|b| b.start_time()), Some(20));

        let (block, previous, next) = buffer.lookup_with_neighbors(0).expect("块");
        assert_eq!(block.start_time(), 0);
        assert!(previous.is_none());
        assert!(next.is_some());
        assert!(buffer.lookup_with_neighbors(-1).is_none());
    }

    #[test]
    fn test_lookup() {
        let buffer = three_blocks();
        assert_eq!(buffer.lookup(15).map(|b| b.start_time()), Some(10));
        assert_eq!(buffer.lookup(25).map(|b| b.start_time()), Some(20));
        assert_eq!(buffer.lookup(0).map(|b| b.start_time()), Some(0));
        assert!(buffer.lookup(-5).is_none());
        // 超出范围时返回最后一个块
        assert_eq!(buffer.lookup(100).map(|b| b.start_time()), Some(20));
        assert!(BlockBuffer::new(MediaType::Audio, 1).expect("缓冲区").lookup(0).is_none());
    }

    #[test]
    fn test_lookup_间隙() {
        let buffer = BlockBuffer::new(MediaType::Audio, 8).expect("缓冲区");
        buffer.add(filled(&buffer, 0, 10)).expect("加入");
        buffer.add(filled(&buffer, 14, 10)).expect("加入");
        assert_eq!(buffer.lookup(12).map(|b| b.start_time()), Some(0));
    }

    #[test]
    fn test_lookup_重叠时优先包含的块() {
        let buffer = BlockBuffer::new(MediaType::Audio, 8).expect("缓冲区");
        buffer.add(filled(&buffer, 0, 30)).expect("加入");
        buffer.add(filled(&buffer, 10, 2)).expect("加入");
        // 最近的块不包含 t 时, 向前找到覆盖 t 的长块
        assert_eq!(buffer.lookup(15).map(|b| b.start_time()), Some(0));
    }

    #[test]
    fn test_neighbors() {
        let buffer = three_blocks();
        let blocks = buffer.blocks();
        let (prev, next) = buffer.neighbors(&blocks[1]);
        assert!(prev.is_some_and(|b| Arc::ptr_eq(&b, &blocks[0])));
        assert!(next.is_some_and(|b| Arc::ptr_eq(&b, &blocks[2])));

        let (prev, next) = buffer.neighbors(&blocks[0]);
        assert!(prev.is_none());
        assert_eq!(next.map(|b| b.start_time()), Some(10));
        assert!(buffer.next(&blocks[2]).is_none());

        let stranger = Block::new(MediaType::Audio);
        let (prev, next) = buffer.neighbors(&stranger);
        assert!(prev.is_none() && next.is_none());
    }

    #[test]
    fn test_continuous_next() {
        let buffer = BlockBuffer::new(MediaType::Audio, 8).expect("缓冲区");
        buffer.add(filled(&buffer, 0, 10)).expect("加入");
        buffer.add(filled(&buffer, 12, 10)).expect("加入");
        buffer.add(filled(&buffer, 40, 10)).expect("加入");
        let blocks = buffer.blocks();
        assert!(buffer.continuous_next(&blocks[0]).is_some());
        assert!(buffer.continuous_next(&blocks[1]).is_none());
    }

    #[test]
    fn test_range_统计() {
        let buffer = three_blocks();
        assert_eq!(buffer.range_start_time(), 0);
        assert_eq!(buffer.range_end_time(), 30);
        assert_eq!(buffer.range_duration(), 30);
        assert_eq!(buffer.average_block_duration(), 10);
        assert!(buffer.is_monotonic());
        assert!(buffer.is_in_range(30));
        assert!(!buffer.is_in_range(31));
        assert!((buffer.range_percent(15) - 0.5).abs() < f64::EPSILON);
        assert!(!buffer.is_full());
        assert!((buffer.capacity_percent() - 3.0 / 8.0).abs() < f64::EPSILON);
        // 300 字节 / 30 tick
        assert_eq!(buffer.range_bitrate(), 300 * 8 * TICKS_PER_SECOND as u64 / 30);
    }

    #[test]
    fn test_clear_与_dispose() {
        let buffer = three_blocks();
        let blocks = buffer.blocks();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.pool_count(), 3);
        assert_eq!(buffer.lifetime_count(), 3, "清空不影响累计计数");

        assert!(blocks.iter().all(|b| !b.is_in_buffer()));

        buffer.dispose();
        assert_eq!(buffer.pool_count(), 0);
        assert_eq!(buffer.lifetime_count(), 0);
        assert!(blocks.iter().all(|b| b.is_released()));
        assert!(blocks[0].acquire_read().is_none());
    }

    #[test]
    fn test_rent_跳过已释放的槽位() {
        let buffer = BlockBuffer::new(MediaType::Audio, 1).expect("缓冲区");
        let first = filled(&buffer, 0, 10);
        buffer.add(Arc::clone(&first)).expect("加入");
        buffer.add(filled(&buffer, 10, 10)).expect("加入");
        assert_eq!(buffer.pool_count(), 1);

        // 池中的槽位被外部释放后不再复用
        first.release();
        let fresh = buffer.rent();
        assert!(!fresh.is_released());
        assert!(!fresh.is_allocated());
        assert_eq!(buffer.pool_count(), 0);
    }
}
