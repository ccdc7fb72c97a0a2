//! # liu-engine
//!
//! 播放引擎状态: 由解码遥测推导缓冲/下载进度, 估算码率,
//! 跟踪播放位置, 并在状态真正变化时各发出一次通知.
//!
//! 各字段相互独立地原子更新, 解码线程与渲染线程可以并发读写,
//! 不保证跨字段的一致快照.

pub mod config;
pub mod event;
pub mod snapshot;
pub mod state;

mod atomic;
mod buffering;
mod position;

// 重导出常用类型
pub use config::EngineConfig;
pub use event::{EngineEvent, EventSink, FnSink, NullSink};
pub use snapshot::{ChangedFields, EngineSnapshot};
pub use state::{EngineState, MediaState, StreamProfile};
