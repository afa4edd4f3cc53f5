//! SocketCAN 适配器分离实现
//!
//! 提供独立的 RX 和 TX 适配器，支持双线程并发访问。
//! 基于 `CanSocket::try_clone()` 实现，利用 Linux 的 `dup()` 系统调用。
//!
//! # ⚠️ 关键警告：`try_clone()` 的共享状态陷阱
//!
//! `try_clone()` 通过 `dup()` 系统调用复制文件描述符（FD），这意味着：
//!
//! 1. **文件状态标志共享**：`O_NONBLOCK` 等标志保存在"打开文件描述"中，而不是 FD 中。
//!    - **后果**：如果在 RX 线程对 socket 设置了 `set_nonblocking(true)`，TX 线程的
//!      socket **也会瞬间变成非阻塞模式**（反之亦然）。
//!    - **避坑指南**：**严禁在分离后的适配器中使用 `set_nonblocking()`**。
//!      超时必须严格依赖 `SO_RCVTIMEO` 和 `SO_SNDTIMEO`。
//!
//! 2. **过滤器共享**：`CAN_RAW_FILTER` 绑定在打开文件描述上。
//!    - **后果**：RX 适配器设置的硬件过滤器会影响所有共享该打开文件描述的 FD。
//!    - **现状**：当前设计是安全的（TX 只写不读），但需知晓此特性。

use super::{from_can_frame, map_read_error, to_can_frame};
use crate::{CanError, RxAdapter, TxAdapter};
use pedalbox_protocol::BusFrame;
use socketcan::{CanFilter, CanSocket, Socket, SocketOptions};
use std::os::unix::io::{AsFd, AsRawFd};
use std::time::Duration;
use tracing::{trace, warn};

/// 只读适配器（用于 RX 线程）
///
/// 独立的 RX 适配器，持有 `CanSocket` 的克隆，
/// 可以在不同线程中与 [`SocketCanTxAdapter`] 并发使用。
///
/// # 关键设计
/// - **硬件过滤器**：在初始化时按指令 ID 列表配置，无关帧不会到达用户态
/// - **读超时**：使用 `SO_RCVTIMEO` 实现，RX 循环靠超时轮询退出信号
/// - **FD 共享**：通过 `try_clone()` 共享同一个打开的文件描述
pub struct SocketCanRxAdapter {
    socket: CanSocket,
    read_timeout: Duration,
}

impl SocketCanRxAdapter {
    /// 创建新的 RX 适配器
    ///
    /// `filter_ids` 为需要接收的 CAN ID 列表（精确匹配）；
    /// 为空时不配置过滤器，接收所有帧。
    ///
    /// # Errors
    /// - `CanError::Io`: 克隆 socket、设置超时或配置过滤器失败
    pub fn new(
        socket: &CanSocket,
        read_timeout: Duration,
        filter_ids: &[u32],
    ) -> Result<Self, CanError> {
        let rx_socket = socket
            .as_fd()
            .try_clone_to_owned()
            .map(CanSocket::from)
            .map_err(|e| {
                CanError::Io(std::io::Error::other(format!(
                    "Failed to clone SocketCAN socket for RX: {}",
                    e
                )))
            })?;

        // 使用 SO_RCVTIMEO 设置读超时，避免依赖 O_NONBLOCK
        rx_socket.set_read_timeout(read_timeout).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to set read timeout on RX socket: {}",
                e
            )))
        })?;

        if !filter_ids.is_empty() {
            Self::configure_hardware_filters(&rx_socket, filter_ids)?;
        }

        Ok(Self {
            socket: rx_socket,
            read_timeout,
        })
    }

    /// 配置硬件过滤器
    ///
    /// 只接收指令总线上相关的 CAN ID，过滤掉无关帧。
    /// 这能显著降低在繁忙总线上的 CPU 占用。
    ///
    /// 掩码取 `0x7FF`：指令 ID 都落在标准帧范围内，但发送端可能用
    /// 扩展帧携带同一 ID，低 11 位匹配即放行。
    fn configure_hardware_filters(socket: &CanSocket, filter_ids: &[u32]) -> Result<(), CanError> {
        let filters: Vec<CanFilter> = filter_ids
            .iter()
            .map(|&id| CanFilter::new(id, 0x7FF))
            .collect();

        socket.set_filters(&filters).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to set hardware filters: {}",
                e
            )))
        })?;

        trace!(
            "SocketCAN hardware filters configured: {} IDs",
            filters.len()
        );

        Ok(())
    }

    /// 获取读超时时间
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 设置读超时
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_read_timeout(timeout).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to set read timeout: {}",
                e
            )))
        })?;
        self.read_timeout = timeout;
        Ok(())
    }
}

impl RxAdapter for SocketCanRxAdapter {
    fn receive(&mut self) -> Result<BusFrame, CanError> {
        let can_frame = self.socket.read_frame().map_err(map_read_error)?;
        from_can_frame(can_frame)
    }
}

impl Drop for SocketCanRxAdapter {
    fn drop(&mut self) {
        trace!(
            "SocketCanRxAdapter dropped (FD: {})",
            self.socket.as_raw_fd()
        );
        // SocketCAN socket 会自动关闭，无需额外操作
    }
}

/// 只写适配器（用于 TX 线程）
///
/// 独立的 TX 适配器，持有 `CanSocket` 的克隆，
/// 可以在不同线程中与 [`SocketCanRxAdapter`] 并发使用。
///
/// # 关键设计
/// - **发送超时**：使用 `SO_SNDTIMEO` 实现，避免在总线错误时无限阻塞
/// - **FD 共享**：通过 `try_clone()` 共享同一个打开的文件描述
pub struct SocketCanTxAdapter {
    socket: CanSocket,
}

impl SocketCanTxAdapter {
    /// 创建新的 TX 适配器
    ///
    /// # Errors
    /// - `CanError::Io`: 克隆 socket 或设置写超时失败
    pub fn new(socket: &CanSocket) -> Result<Self, CanError> {
        let tx_socket = socket
            .as_fd()
            .try_clone_to_owned()
            .map(CanSocket::from)
            .map_err(|e| {
                CanError::Io(std::io::Error::other(format!(
                    "Failed to clone SocketCAN socket for TX: {}",
                    e
                )))
            })?;

        // 设置发送超时（5ms，快速失败）
        // 关键：避免 TX 线程在总线错误（Error Passive/Bus Off）或缓冲区满时无限阻塞
        tx_socket
            .set_write_timeout(Duration::from_millis(5))
            .map_err(|e| {
                CanError::Io(std::io::Error::other(format!(
                    "Failed to set write timeout on TX socket: {}",
                    e
                )))
            })?;

        trace!("SocketCanTxAdapter created with 5ms write timeout");

        Ok(Self { socket: tx_socket })
    }
}

impl TxAdapter for SocketCanTxAdapter {
    fn send(&mut self, frame: BusFrame) -> Result<(), CanError> {
        let can_frame = to_can_frame(&frame)?;

        self.socket.write_frame(&can_frame).map_err(|e| {
            warn!("TX: Failed to send frame ID=0x{:X}: {}", frame.id, e);
            map_read_error(e)
        })?;

        trace!("TX: Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        Ok(())
    }
}

impl Drop for SocketCanTxAdapter {
    fn drop(&mut self) {
        trace!(
            "SocketCanTxAdapter dropped (FD: {})",
            self.socket.as_raw_fd()
        );
    }
}
