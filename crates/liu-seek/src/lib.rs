//! # liu-seek
//!
//! 单个视频流的稀疏关键帧索引, 用于快速跳转.
//!
//! 解码线程在产出关键帧时调用 [`SeekIndex::try_add`] 记录位置,
//! 跳转命令通过 [`SeekIndex::find`] 找到目标时间之前最近的关键帧.
//! 索引可以保存为带版本号的行文本, 在下次打开同一媒体时直接加载.

pub mod entry;
pub mod index;
mod persist;

// 重导出常用类型
pub use entry::{KeyframeDescriptor, SeekIndexEntry};
pub use index::SeekIndex;
pub use persist::{ENTRY_FIELDS, INDEX_FIELDS, SECTION_HEADER};
