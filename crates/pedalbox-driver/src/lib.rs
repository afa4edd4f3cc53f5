//! 驱动层模块
//!
//! 刹车执行器网关的设备驱动功能，包括：
//! - IO 线程管理（指令 RX / 两路 TX / 保活 / 踏板采样）
//! - 指令路由状态机（训练模式 / 锁定 / KillAuton）
//! - 踏板 ADC 换算链
//!
//! # 使用
//!
//! 通过 [`BrakeEcuBuilder`] 构造 [`BrakeEcu`]，Linux 下默认走 SocketCAN；
//! 测试或其他平台用 `build_with_adapters()` 注入任意适配器实现。

mod builder;
mod config;
mod ecu;
mod error;
pub mod mode;
pub mod pedal;
pub mod pipeline;
pub mod router;

pub use builder::BrakeEcuBuilder;
pub use config::EcuConfig;
pub use ecu::BrakeEcu;
pub use error::DriverError;
pub use mode::ModeFlags;
pub use pedal::{PedalSource, percent_from_raw};
pub use pipeline::{keep_alive_loop, pedal_loop, rx_loop, tx_loop};
pub use router::{EcuContext, route_command};
