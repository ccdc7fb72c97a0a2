//! # liu-core
//!
//! Liu 播放引擎核心库, 提供媒体类型、时间基、tick 时间单位和统一错误类型.
//!
//! 其余 crate (缓冲块、关键帧索引、引擎状态) 都建立在本 crate 之上.

pub mod error;
pub mod media_type;
pub mod rational;
pub mod ticks;

// 重导出常用类型
pub use error::{LiuError, LiuResult};
pub use media_type::MediaType;
pub use rational::Rational;
pub use ticks::{TICKS_PER_SECOND, Ticks};
