//! 驱动层错误类型定义

use pedalbox_can::CanError;
use pedalbox_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议错误（无效百分比 / 无效指令 ID / 配置范围错误）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 帧通道已关闭（TX 线程退出）
    #[error("Frame channel closed")]
    ChannelClosed,

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
