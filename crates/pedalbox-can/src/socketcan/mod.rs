//! SocketCAN CAN 适配器实现
//!
//! 支持 Linux 平台下的 SocketCAN，使用内核级的 CAN 通讯接口。
//!
//! ## 特性
//!
//! - 基于 Linux SocketCAN 子系统
//! - 支持标准帧和扩展帧
//! - 自动过滤错误帧
//! - 禁用 loopback：指令总线上我们自己发出的训练镜像帧不会被
//!   回环到 RX 端再次进入路由器
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**：SocketCAN 是 Linux 内核特性
//! - **接口配置**：波特率等配置由系统工具（`ip link`）完成，不在应用层设置

use crate::{CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError};
use pedalbox_protocol::BusFrame;
use socketcan::{
    CanError as SocketCanError, CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket,
    StandardId,
};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use tracing::{trace, warn};

mod interface_check;
pub mod split;

use interface_check::check_interface_status;
pub use split::{SocketCanRxAdapter, SocketCanTxAdapter};

/// SocketCAN 适配器
///
/// 实现 [`CanAdapter`] trait，可通过 [`crate::SplittableAdapter`]
/// 分离为独立的 RX / TX 两半供双线程并发使用。
#[derive(Debug)]
pub struct SocketCanAdapter {
    /// SocketCAN socket
    socket: CanSocket,
    /// 接口名称（如 "can0"）
    interface: String,
    /// 读超时时间（用于 receive 方法）
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 创建新的 SocketCAN 适配器
    ///
    /// 在打开 socket 之前检查接口是否存在且已启动（UP 状态），
    /// 错误信息中附带修复命令提示。
    ///
    /// # Errors
    /// - `CanError::Device`: 接口不存在 / 未启动 / 无法打开
    /// - `CanError::Io`: 系统调用失败（如权限不足）
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        match check_interface_status(&interface) {
            Ok(true) => {
                trace!("CAN interface '{}' is UP, proceeding", interface);
            },
            Ok(false) => {
                return Err(CanError::Device(
                    format!(
                        "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                        interface, interface
                    )
                    .into(),
                ));
            },
            Err(e) => return Err(e),
        }

        let socket = CanSocket::open(&interface).map_err(|e| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::Backend,
                format!("Failed to open CAN interface '{}': {}", interface, e),
            ))
        })?;

        // 禁用 loopback。默认情况下 SocketCAN 会把本进程发送的帧回环给
        // 本进程的接收端；指令总线的 TX 半边发送训练镜像（SetBrake 形状），
        // 回环会让它被当作远程刹车指令重新进入路由器。
        let loopback_enabled: libc::c_int = 0;
        let loopback_result = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_LOOPBACK,
                &loopback_enabled as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };

        if loopback_result < 0 {
            warn!(
                "Failed to disable CAN_RAW_LOOPBACK on '{}': {}",
                interface,
                std::io::Error::last_os_error()
            );
        } else {
            trace!("SocketCAN interface '{}' loopback disabled", interface);
        }

        // 默认读超时 2ms，确保 RX 循环能及时响应退出信号
        let read_timeout = Duration::from_millis(2);
        socket.set_read_timeout(read_timeout).map_err(CanError::Io)?;

        Ok(Self {
            socket,
            interface,
            read_timeout,
        })
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 获取读超时时间
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// 设置读超时
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_read_timeout(timeout).map_err(CanError::Io)?;
        self.read_timeout = timeout;
        Ok(())
    }

    /// 分离为 RX/TX 两半，同时为 RX 半边配置硬件过滤器
    ///
    /// 指令总线用此入口：RX 半边只放行给定的指令 ID，
    /// TX 半边发送训练镜像与 KillAuton 帧。
    pub fn split_with_filters(
        self,
        filter_ids: &[u32],
    ) -> Result<(SocketCanRxAdapter, SocketCanTxAdapter), CanError> {
        let adapter = ManuallyDrop::new(self);

        let rx_adapter =
            SocketCanRxAdapter::new(&adapter.socket, adapter.read_timeout, filter_ids)?;
        let tx_adapter = SocketCanTxAdapter::new(&adapter.socket)?;

        trace!(
            "SocketCanAdapter split with {} RX filters (interface: {})",
            filter_ids.len(),
            adapter.interface
        );

        Ok((rx_adapter, tx_adapter))
    }
}

/// `BusFrame` → `socketcan::CanFrame` 转换
pub(crate) fn to_can_frame(frame: &BusFrame) -> Result<CanFrame, CanError> {
    if frame.is_extended {
        ExtendedId::new(frame.id)
            .and_then(|id| CanFrame::new(id, &frame.data[..frame.len as usize]))
            .ok_or_else(|| {
                CanError::Device(
                    format!("Failed to create extended frame with ID 0x{:X}", frame.id).into(),
                )
            })
    } else {
        StandardId::new(frame.id as u16)
            .and_then(|id| CanFrame::new(id, &frame.data[..frame.len as usize]))
            .ok_or_else(|| {
                CanError::Device(
                    format!("Failed to create standard frame with ID 0x{:X}", frame.id).into(),
                )
            })
    }
}

/// `socketcan::CanFrame` → `BusFrame` 转换
///
/// 错误帧转换为相应的 `CanError`，远程帧按无效帧处理。
pub(crate) fn from_can_frame(frame: CanFrame) -> Result<BusFrame, CanError> {
    match frame {
        CanFrame::Data(data_frame) => {
            let (id, is_extended) = match data_frame.id() {
                Id::Standard(id) => (id.as_raw() as u32, false),
                Id::Extended(id) => (id.as_raw(), true),
            };
            Ok(if is_extended {
                BusFrame::new_extended(id, data_frame.data())
            } else {
                BusFrame::new_standard(id as u16, data_frame.data())
            })
        },
        CanFrame::Remote(_) => Err(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::InvalidFrame,
            "RTR frames not supported",
        ))),
        CanFrame::Error(error_frame) => {
            let socketcan_error = SocketCanError::from(error_frame);
            match &socketcan_error {
                SocketCanError::BusOff => {
                    warn!("CAN Bus Off error detected");
                    Err(CanError::BusOff)
                },
                SocketCanError::ControllerProblem(problem) => {
                    let problem_str = format!("{}", problem);
                    if problem_str.to_lowercase().contains("overflow") {
                        warn!("CAN Buffer Overflow detected: {}", problem);
                        Err(CanError::BufferOverflow)
                    } else {
                        warn!("CAN Controller Problem: {}, ignoring", problem);
                        Err(CanError::Timeout)
                    }
                },
                _ => {
                    warn!("CAN Error Frame received: {}, ignoring", socketcan_error);
                    Err(CanError::Timeout)
                },
            }
        },
    }
}

/// 将 `read_frame` 的 IO 错误映射为 `CanError`
pub(crate) fn map_read_error(e: std::io::Error) -> CanError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => CanError::Timeout,
        _ => CanError::Io(e),
    }
}

impl CanAdapter for SocketCanAdapter {
    /// 发送帧（Fire-and-Forget）
    fn send(&mut self, frame: BusFrame) -> Result<(), CanError> {
        let can_frame = to_can_frame(&frame)?;
        self.socket.write_frame(&can_frame).map_err(CanError::Io)?;
        Ok(())
    }

    /// 接收帧（带读超时）
    ///
    /// 错误帧会被内部过滤：总线致命错误向上传播，其余按超时处理，
    /// 由调用方的接收循环自然重试。
    fn receive(&mut self) -> Result<BusFrame, CanError> {
        let can_frame = self.socket.read_frame().map_err(map_read_error)?;
        from_can_frame(can_frame)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = SocketCanAdapter::set_read_timeout(self, timeout) {
            warn!("Failed to set receive timeout on '{}': {}", self.interface, e);
        }
    }
}

use crate::SplittableAdapter;
use std::mem::ManuallyDrop;

impl SplittableAdapter for SocketCanAdapter {
    type RxAdapter = SocketCanRxAdapter;
    type TxAdapter = SocketCanTxAdapter;

    /// 分离为独立的 RX 和 TX 适配器
    ///
    /// 两半通过 `dup()` 共享同一个"打开文件描述"，文件状态标志
    /// （如 `O_NONBLOCK`）是共享的，因此分离后严禁使用
    /// `set_nonblocking()`，超时必须依赖 `SO_RCVTIMEO`。
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        self.split_with_filters(&[])
    }
}
