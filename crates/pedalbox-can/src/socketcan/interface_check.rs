//! CAN 接口状态检查模块
//!
//! 使用 ioctl 系统调用检查 Linux 网络接口是否存在且已启动（UP 状态）。
//!
//! 此模块仅提供检查功能，不进行任何配置操作，因此不需要特殊权限。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError};
use libc::{AF_INET, IFF_UP, SIOCGIFFLAGS, SOCK_DGRAM, if_nametoindex, ifreq};
use std::ffi::CString;
use std::io;
use tracing::trace;

/// 检查 CAN 接口是否存在且已启动（管理态 UP）
///
/// 使用 `if_nametoindex()` 检查接口是否存在，使用 `ioctl(SIOCGIFFLAGS)` 检查接口状态。
///
/// # 返回值
/// - `Ok(true)`: 接口存在且 IFF_UP 标志位为真
/// - `Ok(false)`: 接口存在但处于 DOWN 状态
/// - `Err(CanError::Device)`: 接口不存在或接口名无效
/// - `Err(CanError::Io)`: 系统调用失败（socket/ioctl 错误）
///
/// # 权限要求
/// 只进行读取操作，普通用户即可执行，不需要 root 或 CAP_NET_ADMIN 权限。
pub fn check_interface_status(interface: &str) -> Result<bool, CanError> {
    // ifr_name 是 IFNAMSIZ = 16 字节，包括结尾的 NUL，所以最大长度是 15
    const MAX_IFACE_NAME_LEN: usize = 15;
    if interface.len() > MAX_IFACE_NAME_LEN {
        return Err(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!(
                "Interface name '{}' is too long (max {} characters)",
                interface, MAX_IFACE_NAME_LEN
            ),
        )));
    }

    let c_iface = CString::new(interface).map_err(|e| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!("Invalid interface name: {}", e),
        ))
    })?;

    // 检查接口是否存在
    let ifindex = unsafe { if_nametoindex(c_iface.as_ptr()) };
    if ifindex == 0 {
        let errno = io::Error::last_os_error();
        return Err(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!(
                "CAN interface '{}' does not exist ({}). Please create it first:\n  sudo ip link add dev {} type can",
                interface, errno, interface
            ),
        )));
    }

    // 准备 ifreq 结构
    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    let c_iface_bytes = interface.as_bytes();

    unsafe {
        std::ptr::copy_nonoverlapping(
            c_iface_bytes.as_ptr(),
            ifr.ifr_name.as_mut_ptr() as *mut u8,
            c_iface_bytes.len(),
        );
        // 确保以 NUL 结尾
        ifr.ifr_name[c_iface_bytes.len()] = 0;
    }

    // 创建 socket 用于 ioctl，RAII 确保 socket 被正确关闭
    struct FdGuard(libc::c_int);
    impl Drop for FdGuard {
        fn drop(&mut self) {
            if self.0 >= 0 {
                unsafe { libc::close(self.0) };
            }
        }
    }

    let sockfd = unsafe { libc::socket(AF_INET, SOCK_DGRAM, 0) };
    if sockfd < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    let _guard = FdGuard(sockfd);

    let result = unsafe {
        libc::ioctl(
            sockfd,
            SIOCGIFFLAGS,
            &mut ifr as *mut _ as *mut libc::c_void,
        )
    };

    if result < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }

    // ifreq 使用 union，ifru_flags 是 union 的第一个字段（c_short），
    // 对齐和大小都匹配，按指针访问
    let flags = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_short) };
    let is_up = (flags as i32 & IFF_UP) != 0;

    trace!(
        "Interface '{}' status: {}",
        interface,
        if is_up { "UP" } else { "DOWN" }
    );
    Ok(is_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn interface_exists(interface: &str) -> bool {
        Command::new("ip")
            .args(["link", "show", interface])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_check_interface_status_exists() {
        let interface = "vcan0";
        if !interface_exists(interface) {
            eprintln!("Skipping test: {} does not exist", interface);
            return;
        }

        let result = check_interface_status(interface);
        assert!(
            result.is_ok(),
            "check_interface_status should succeed for existing interface"
        );
    }

    #[test]
    fn test_check_interface_status_not_exists() {
        let result = check_interface_status("can999");
        assert!(
            result.is_err(),
            "check_interface_status should fail for non-existent interface"
        );

        if let Err(CanError::Device(e)) = result {
            assert_eq!(e.kind, CanDeviceErrorKind::NotFound);
            assert!(
                e.message.contains("does not exist"),
                "Error message should mention interface does not exist, got: {}",
                e.message
            );
            assert!(
                e.message.contains("ip link add"),
                "Error message should suggest creating interface, got: {}",
                e.message
            );
        } else {
            panic!("Expected Device error");
        }
    }

    #[test]
    fn test_check_interface_status_invalid_name() {
        let result = check_interface_status("can0\0");
        assert!(result.is_err());

        if let Err(CanError::Device(e)) = result {
            assert!(e.message.contains("Invalid interface name"));
        } else {
            panic!("Expected Device error");
        }
    }

    #[test]
    fn test_check_interface_status_too_long_name() {
        let too_long_name = "a".repeat(20);
        let result = check_interface_status(&too_long_name);
        assert!(result.is_err());

        if let Err(CanError::Device(e)) = result {
            assert!(e.message.contains("too long"));
        } else {
            panic!("Expected Device error");
        }
    }
}
