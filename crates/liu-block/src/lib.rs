//! # liu-block
//!
//! 解码块 (Block) 与按时间排序的块缓冲区 (BlockBuffer).
//!
//! 解码线程从缓冲区租用块槽位、填充解码结果后放回缓冲区;
//! 渲染线程按墙钟时间查询当前应呈现的块, 只通过作用域守卫读取负载.
//!
//! ```rust
//! use liu_block::{AudioBlock, BlockBuffer, BlockTiming};
//! use liu_core::MediaType;
//!
//! let buffer = BlockBuffer::new(MediaType::Audio, 8).unwrap();
//! let block = buffer.rent();
//! let timing = BlockTiming { start_time: 0, duration: 10, ..BlockTiming::default() };
//! block.fill_audio(timing, &[0u8; 16], AudioBlock::new(48_000, 2, 4)).unwrap();
//! buffer.add(block).unwrap();
//! assert!(buffer.lookup(5).is_some());
//! ```

pub mod audio;
pub mod block;
pub mod buffer;
pub mod buffers;
pub mod subtitle;
pub mod video;

// 重导出常用类型
pub use audio::AudioBlock;
pub use block::{Block, BlockKind, BlockReadGuard, BlockTiming, BlockWriteGuard};
pub use buffer::{BlockBuffer, default_capacity};
pub use buffers::{BlockBuffers, main_media_type};
pub use subtitle::{SubtitleBlock, SubtitleFormat};
pub use video::VideoBlock;
