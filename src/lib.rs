//! # Liu (流)
//!
//! 纯 Rust 实现的媒体播放块缓冲与同步引擎.
//!
//! - **块缓冲**: 每种媒体类型一个有界、按时间排序的解码块缓冲区, 槽位循环复用
//! - **跳转索引**: 关键帧索引及其文本持久化格式
//! - **播放引擎**: 缓冲/下载进度、码率估算、播放位置跟踪与变化通知
//!
//! # 快速开始
//!
//! ```rust
//! use std::sync::Arc;
//! use liu::core::MediaType;
//! use liu::engine::{EngineConfig, NullSink, StreamProfile};
//!
//! let (engine, buffers) = liu::open_engine(
//!     EngineConfig::default(),
//!     [MediaType::Video, MediaType::Audio],
//!     Arc::new(NullSink),
//! )
//! .unwrap();
//! engine.begin_open();
//! engine.complete_open(&StreamProfile::default());
//! assert_eq!(buffers.main_media_type(), Some(MediaType::Video));
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 时间单位、媒体类型与错误类型 |
//! | `liu-block` | 解码块与块缓冲区 |
//! | `liu-seek` | 关键帧跳转索引 |
//! | `liu-engine` | 播放引擎状态 |

use std::sync::Arc;

/// 核心类型与工具
pub use liu_core as core;

/// 解码块与块缓冲区
pub use liu_block as block;

/// 关键帧跳转索引
pub use liu_seek as seek;

/// 播放引擎状态
pub use liu_engine as engine;

/// 获取 Liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 校验配置, 为给定轨道创建缓冲区集合, 并创建引擎状态
pub fn open_engine(
    config: liu_engine::EngineConfig,
    media_types: impl IntoIterator<Item = liu_core::MediaType>,
    sink: Arc<dyn liu_engine::EventSink>,
) -> liu_core::LiuResult<(liu_engine::EngineState, liu_block::BlockBuffers)> {
    config.validate()?;
    let buffers = config.create_buffers(media_types)?;
    Ok((liu_engine::EngineState::new(config, sink), buffers))
}
