//! 解码块槽位.
//!
//! 一个 [`Block`] 拥有一段定长内存和时间元数据, 在 填充 -> 淘汰入池 -> 再次填充
//! 之间循环复用. 负载只能通过 [`BlockReadGuard`] / [`BlockWriteGuard`] 访问,
//! 守卫获取是非阻塞的: 块已释放或正被写入时立即返回 `None`.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use liu_core::{LiuError, LiuResult, MediaType, Ticks};

use crate::audio::AudioBlock;
use crate::subtitle::SubtitleBlock;
use crate::video::VideoBlock;

/// 填充块时由解码端提供的时间元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTiming {
    /// 开始时间 (tick)
    pub start_time: Ticks,
    /// 时长 (tick), 不能为负
    pub duration: Ticks,
    /// 源数据没有可用时间戳, 开始时间由相邻块推算
    pub is_start_time_guessed: bool,
    /// 来源流索引, -1 表示未知
    pub stream_index: i32,
    /// 产生该块的压缩数据字节数
    pub compressed_size: u64,
}

impl Default for BlockTiming {
    fn default() -> Self {
        Self {
            start_time: 0,
            duration: 0,
            is_start_time_guessed: false,
            stream_index: -1,
            compressed_size: 0,
        }
    }
}

/// 各媒体类型特有的块元数据
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// 音频块
    Audio(AudioBlock),
    /// 视频块
    Video(VideoBlock),
    /// 字幕块
    Subtitle(SubtitleBlock),
}

impl BlockKind {
    /// 对应的媒体类型
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Audio(_) => MediaType::Audio,
            Self::Video(_) => MediaType::Video,
            Self::Subtitle(_) => MediaType::Subtitle,
        }
    }

    /// 某媒体类型的默认 (空) 元数据
    pub fn empty(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Audio => Self::Audio(AudioBlock::default()),
            MediaType::Video => Self::Video(VideoBlock::default()),
            MediaType::Subtitle => Self::Subtitle(SubtitleBlock::default()),
        }
    }
}

/// 锁内数据: 负载内存与类型元数据
#[derive(Debug)]
struct BlockMemory {
    buffer: Option<Box<[u8]>>,
    kind: BlockKind,
}

/// 可复用的解码块槽位
///
/// 时间元数据保存在原子字段中, 排序、查找和 `contains` 无需获取块锁;
/// 这些字段只在写守卫内修改.
#[derive(Debug)]
pub struct Block {
    media_type: MediaType,
    start_time: AtomicI64,
    duration: AtomicI64,
    stream_index: AtomicI32,
    start_time_guessed: AtomicBool,
    compressed_size: AtomicU64,
    buffer_length: AtomicUsize,
    released: AtomicBool,
    /// 在某个缓冲区的播放序列中, 期间不能重新填充
    in_buffer: AtomicBool,
    memory: RwLock<BlockMemory>,
}

impl Block {
    /// 创建未分配内存的块
    pub fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            start_time: AtomicI64::new(0),
            duration: AtomicI64::new(0),
            stream_index: AtomicI32::new(-1),
            start_time_guessed: AtomicBool::new(false),
            compressed_size: AtomicU64::new(0),
            buffer_length: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            in_buffer: AtomicBool::new(false),
            memory: RwLock::new(BlockMemory {
                buffer: None,
                kind: BlockKind::empty(media_type),
            }),
        }
    }

    /// 媒体类型 (创建后不变)
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// 开始时间 (tick)
    pub fn start_time(&self) -> Ticks {
        self.start_time.load(Ordering::Acquire)
    }

    /// 时长 (tick)
    pub fn duration(&self) -> Ticks {
        self.duration.load(Ordering::Acquire)
    }

    /// 结束时间, 时长为 0 时等于开始时间
    pub fn end_time(&self) -> Ticks {
        let duration = self.duration();
        let start = self.start_time();
        if duration > 0 { start + duration } else { start }
    }

    /// 开始时间是否为推算值
    pub fn is_start_time_guessed(&self) -> bool {
        self.start_time_guessed.load(Ordering::Acquire)
    }

    /// 来源流索引, -1 表示未知
    pub fn stream_index(&self) -> i32 {
        self.stream_index.load(Ordering::Acquire)
    }

    /// 产生该块的压缩数据字节数
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size.load(Ordering::Acquire)
    }

    /// 已分配内存长度, 未分配时为 0
    pub fn buffer_length(&self) -> usize {
        self.buffer_length.load(Ordering::Acquire)
    }

    /// 是否已释放
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// 是否在某个缓冲区的播放序列中
    pub fn is_in_buffer(&self) -> bool {
        self.in_buffer.load(Ordering::Acquire)
    }

    /// 标记加入/移出播放序列, 返回之前的值
    pub(crate) fn mark_in_buffer(&self, in_buffer: bool) -> bool {
        self.in_buffer.swap(in_buffer, Ordering::AcqRel)
    }

    /// 是否已分配内存
    pub fn is_allocated(&self) -> bool {
        self.buffer_length() > 0
    }

    /// 时间点 `t` 是否落在 `[start_time, end_time]` 内 (时长为 0 的块不包含任何时间点)
    pub fn contains(&self, t: Ticks) -> bool {
        let duration = self.duration();
        if duration <= 0 {
            return false;
        }
        let start = self.start_time();
        start <= t && t <= start + duration
    }

    /// 按开始时间比较
    pub fn compare_to(&self, other: &Block) -> CmpOrdering {
        self.start_time().cmp(&other.start_time())
    }

    /// 分配 `length` 字节内存
    ///
    /// 长度相同的重复分配直接成功; 长度不同则重新分配.
    pub fn allocate(&self, length: usize) -> LiuResult<()> {
        let mut guard = self.write_or_error()?;
        guard.allocate(length)
    }

    /// 释放内存并把所有字段恢复默认值
    ///
    /// 可重复调用, 只有第一次调用返回 `true`. 释放后任何守卫都无法再获取.
    /// 不会阻塞: 仍有守卫存活时, 内存由最后一个守卫离开作用域时回收.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.reclaim();
        true
    }

    /// 已释放且没有守卫存活时回收内存; 锁被占用时由占用方在退出时再次调用
    fn reclaim(&self) {
        if !self.is_released() {
            return;
        }
        let mut memory = match self.memory.try_write() {
            Ok(memory) => memory,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        memory.buffer = None;
        memory.kind = BlockKind::empty(self.media_type);
        self.buffer_length.store(0, Ordering::Release);
        self.store_timing(&BlockTiming::default());
    }

    /// 非阻塞获取读守卫, 块已释放或正被写入时返回 `None`
    pub fn acquire_read(&self) -> Option<BlockReadGuard<'_>> {
        if self.is_released() {
            return None;
        }
        let memory = match self.memory.try_read() {
            Ok(memory) => memory,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        // release 先置位再尝试回收, 这里拿到锁后需要再确认一次
        if self.is_released() {
            drop(memory);
            self.reclaim();
            return None;
        }
        Some(BlockReadGuard {
            memory,
            _reclaim: Reclaim(self),
        })
    }

    /// 非阻塞获取写守卫, 块已释放或正被读写时返回 `None`
    pub fn acquire_write(&self) -> Option<BlockWriteGuard<'_>> {
        if self.is_released() {
            return None;
        }
        let memory = match self.memory.try_write() {
            Ok(memory) => memory,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        if self.is_released() {
            drop(memory);
            self.reclaim();
            return None;
        }
        Some(BlockWriteGuard {
            block: self,
            memory,
            _reclaim: Reclaim(self),
        })
    }

    /// 在写守卫内填充负载、类型元数据和时间元数据
    ///
    /// 各媒体类型的 `fill_*` 方法在调用这里之前完成各自的校验与推算.
    pub(crate) fn fill(&self, timing: BlockTiming, payload: &[u8], kind: BlockKind) -> LiuResult<()> {
        if kind.media_type() != self.media_type {
            return Err(LiuError::InvalidArgument(format!(
                "块类型不匹配: 槽位为{}, 数据为{}",
                self.media_type,
                kind.media_type()
            )));
        }
        if timing.duration < 0 {
            return Err(LiuError::InvalidArgument(format!(
                "时长不能为负: {}",
                timing.duration
            )));
        }
        let mut guard = self.write_or_error()?;
        // 改写开始时间会破坏缓冲区的排序, 只能填充已淘汰或未加入的块
        if self.is_in_buffer() {
            return Err(LiuError::InvalidBlock("块仍在缓冲区中, 不能重新填充".into()));
        }
        guard.allocate(payload.len())?;
        guard.buffer_mut().copy_from_slice(payload);
        guard.memory.kind = kind;
        self.store_timing(&timing);
        Ok(())
    }

    fn write_or_error(&self) -> LiuResult<BlockWriteGuard<'_>> {
        self.acquire_write().ok_or_else(|| {
            if self.is_released() {
                LiuError::BlockReleased
            } else {
                LiuError::BlockBusy
            }
        })
    }

    fn store_timing(&self, timing: &BlockTiming) {
        self.start_time.store(timing.start_time, Ordering::Release);
        self.duration.store(timing.duration, Ordering::Release);
        self.stream_index.store(timing.stream_index, Ordering::Release);
        self.start_time_guessed
            .store(timing.is_start_time_guessed, Ordering::Release);
        self.compressed_size
            .store(timing.compressed_size, Ordering::Release);
    }
}

/// 守卫退出时回收已释放块的内存
///
/// 声明在锁守卫之后, 字段按声明顺序析构, 执行时块锁已经放开.
struct Reclaim<'a>(&'a Block);

impl Drop for Reclaim<'_> {
    fn drop(&mut self) {
        self.0.reclaim();
    }
}

/// 共享读守卫, 存活期间块内存不会被填充或回收
pub struct BlockReadGuard<'a> {
    memory: RwLockReadGuard<'a, BlockMemory>,
    _reclaim: Reclaim<'a>,
}

impl BlockReadGuard<'_> {
    /// 负载数据, 未分配时为空切片
    pub fn buffer(&self) -> &[u8] {
        self.memory.buffer.as_deref().unwrap_or(&[])
    }

    /// 类型元数据
    pub fn kind(&self) -> &BlockKind {
        &self.memory.kind
    }

    /// 音频元数据
    pub fn audio(&self) -> Option<&AudioBlock> {
        match &self.memory.kind {
            BlockKind::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    /// 视频元数据
    pub fn video(&self) -> Option<&VideoBlock> {
        match &self.memory.kind {
            BlockKind::Video(video) => Some(video),
            _ => None,
        }
    }

    /// 字幕元数据
    pub fn subtitle(&self) -> Option<&SubtitleBlock> {
        match &self.memory.kind {
            BlockKind::Subtitle(subtitle) => Some(subtitle),
            _ => None,
        }
    }
}

/// 独占写守卫
pub struct BlockWriteGuard<'a> {
    block: &'a Block,
    memory: RwLockWriteGuard<'a, BlockMemory>,
    _reclaim: Reclaim<'a>,
}

impl BlockWriteGuard<'_> {
    /// 分配 `length` 字节, 长度相同时保留原有内存
    pub fn allocate(&mut self, length: usize) -> LiuResult<()> {
        if length == 0 {
            return Err(LiuError::InvalidArgument("分配长度必须大于 0".into()));
        }
        if self.memory.buffer.as_ref().is_some_and(|b| b.len() == length) {
            return Ok(());
        }
        self.memory.buffer = Some(vec![0u8; length].into_boxed_slice());
        self.block.buffer_length.store(length, Ordering::Release);
        Ok(())
    }

    /// 可写负载, 未分配时为空切片
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.memory.buffer.as_deref_mut().unwrap_or(&mut [])
    }

    /// 负载数据
    pub fn buffer(&self) -> &[u8] {
        self.memory.buffer.as_deref().unwrap_or(&[])
    }

    /// 类型元数据
    pub fn kind(&self) -> &BlockKind {
        &self.memory.kind
    }
}
