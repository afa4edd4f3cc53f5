//! # Pedalbox CAN 适配层
//!
//! CAN 硬件抽象层，提供统一的总线接口抽象。
//! 网关需要两条独立的总线：高优先级指令总线（收发）与执行器总线（只发），
//! 二者都通过这里的 trait 访问，测试时可替换为通道驱动的 mock。

use std::time::Duration;
use thiserror::Error;

// 重新导出协议层帧类型
pub use pedalbox_protocol::BusFrame;

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanAdapter;

#[cfg(target_os = "linux")]
pub use socketcan::split::{SocketCanRxAdapter, SocketCanTxAdapter};

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Device not started")]
    NotStarted,
}

impl CanError {
    /// 是否为致命错误（设备消失、权限问题等，IO 线程应停止并传播退出信号）
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Device(e) => e.is_fatal(),
            CanError::BufferOverflow | CanError::BusOff => true,
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    UnsupportedConfig,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 统一的收发适配器接口
pub trait CanAdapter {
    fn send(&mut self, frame: BusFrame) -> Result<(), CanError>;
    fn receive(&mut self) -> Result<BusFrame, CanError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
    fn try_receive(&mut self) -> Result<Option<BusFrame>, CanError> {
        match self.receive() {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// 只读适配器（RX 线程独占）
pub trait RxAdapter: Send {
    fn receive(&mut self) -> Result<BusFrame, CanError>;
}

/// 只写适配器（TX 线程独占）
pub trait TxAdapter: Send {
    fn send(&mut self, frame: BusFrame) -> Result<(), CanError>;
}

/// 可分离为独立 RX/TX 两半的适配器
///
/// 指令总线同时需要接收（路由器）和发送（训练镜像 / KillAuton），
/// 分离后两半可在不同线程中并发使用。
pub trait SplittableAdapter: CanAdapter {
    type RxAdapter: RxAdapter;
    type TxAdapter: TxAdapter;
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_fatal_classification() {
        assert!(CanDeviceError::new(CanDeviceErrorKind::NoDevice, "gone").is_fatal());
        assert!(CanDeviceError::new(CanDeviceErrorKind::AccessDenied, "perm").is_fatal());
        assert!(!CanDeviceError::new(CanDeviceErrorKind::Unknown, "eh").is_fatal());
    }

    #[test]
    fn test_can_error_fatal_classification() {
        assert!(CanError::BufferOverflow.is_fatal());
        assert!(CanError::BusOff.is_fatal());
        assert!(!CanError::Timeout.is_fatal());
        assert!(
            CanError::Device(CanDeviceError::new(CanDeviceErrorKind::NotFound, "missing"))
                .is_fatal()
        );
    }

    #[test]
    fn test_device_error_display() {
        let e = CanDeviceError::new(CanDeviceErrorKind::Backend, "open failed");
        assert_eq!(format!("{}", e), "Backend: open failed");
    }
}
