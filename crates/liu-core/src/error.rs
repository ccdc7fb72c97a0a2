//! 统一错误类型定义.
//!
//! 所有 Liu crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Liu 引擎统一错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// 无效参数 (例如分配长度为 0)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 缓冲块校验失败, 不会被加入缓冲区
    #[error("无效缓冲块: {0}")]
    InvalidBlock(String),

    /// 缓冲块已释放, 不能再读写
    #[error("缓冲块已释放")]
    BlockReleased,

    /// 缓冲块正被其他线程占用, 调用方应在下个周期重试
    #[error("缓冲块正被占用")]
    BlockBusy,

    /// 无效数据 (损坏的索引文件等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// Liu 引擎统一 Result 类型
pub type LiuResult<T> = Result<T, LiuError>;
