//! Builder 模式实现
//!
//! 提供链式构造 [`BrakeEcu`] 实例的便捷方式。

use crate::config::EcuConfig;
use crate::ecu::BrakeEcu;
use crate::error::DriverError;
use crate::pedal::PedalSource;
use pedalbox_can::{RxAdapter, TxAdapter};
use pedalbox_protocol::BrakeEncoder;

#[cfg(target_os = "linux")]
use pedalbox_can::SocketCanAdapter;
#[cfg(target_os = "linux")]
use pedalbox_can::SplittableAdapter;
#[cfg(target_os = "linux")]
use pedalbox_protocol::ids::INBOUND_COMMAND_IDS;

/// 网关 Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use pedalbox_driver::BrakeEcuBuilder;
/// # use pedalbox_driver::pedal::PedalSource;
/// # struct NullPedal;
/// # impl PedalSource for NullPedal {
/// #     fn read_raw(&mut self) -> std::io::Result<u16> { Ok(0) }
/// # }
///
/// let ecu = BrakeEcuBuilder::new()
///     .command_interface("can0")
///     .actuator_interface("can1")
///     .actuator_id(0xFF0000)
///     .travel_range(2000, 0)
///     .build(NullPedal)
///     .unwrap();
/// ```
pub struct BrakeEcuBuilder {
    /// 指令总线 SocketCAN 接口名
    command_interface: Option<String>,
    /// 执行器总线 SocketCAN 接口名
    actuator_interface: Option<String>,
    /// 出站执行器帧的扩展 CAN ID
    actuator_id: u32,
    /// 最大行程（0.001 英寸）
    max_dist: u16,
    /// 最小行程（0.001 英寸）
    min_dist: u16,
    /// 线程配置
    config: Option<EcuConfig>,
}

impl BrakeEcuBuilder {
    /// 创建新的 Builder（默认 can0 / can1、执行器 ID 0xFF0000、行程 0-2000）
    pub fn new() -> Self {
        Self {
            command_interface: None,
            actuator_interface: None,
            actuator_id: 0xFF0000,
            max_dist: 2000,
            min_dist: 0,
            config: None,
        }
    }

    /// 设置指令总线接口（可选，默认 "can0"）
    pub fn command_interface(mut self, interface: impl Into<String>) -> Self {
        self.command_interface = Some(interface.into());
        self
    }

    /// 设置执行器总线接口（可选，默认 "can1"）
    pub fn actuator_interface(mut self, interface: impl Into<String>) -> Self {
        self.actuator_interface = Some(interface.into());
        self
    }

    /// 设置执行器指令帧 CAN ID（可选，默认 0xFF0000）
    pub fn actuator_id(mut self, id: u32) -> Self {
        self.actuator_id = id;
        self
    }

    /// 设置行程范围（可选，默认 max 2000 / min 0，单位 0.001 英寸）
    ///
    /// `max_dist` 必须严格大于 `min_dist`，否则 `build` 失败。
    pub fn travel_range(mut self, max_dist: u16, min_dist: u16) -> Self {
        self.max_dist = max_dist;
        self.min_dist = min_dist;
        self
    }

    /// 设置线程配置（可选）
    pub fn config(mut self, config: EcuConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 用 SocketCAN 后端构建（仅 Linux）
    ///
    /// 指令总线分离为 RX（带入站指令 ID 硬件过滤器）和 TX 两半；
    /// 执行器总线只保留 TX 半边。
    ///
    /// # Errors
    /// - `DriverError::Can`: 接口不存在 / 未启动 / 打开失败
    /// - `DriverError::Protocol`: 行程配置非法
    #[cfg(target_os = "linux")]
    pub fn build<P>(self, pedal: P) -> Result<BrakeEcu, DriverError>
    where
        P: PedalSource + 'static,
    {
        let config = self.config.clone().unwrap_or_default();

        let command_iface = self.command_interface.as_deref().unwrap_or("can0");
        let actuator_iface = self.actuator_interface.as_deref().unwrap_or("can1");

        let mut command_adapter = SocketCanAdapter::new(command_iface)?;
        command_adapter
            .set_read_timeout(std::time::Duration::from_millis(config.receive_timeout_ms))?;
        let (command_rx, command_tx) = command_adapter.split_with_filters(&INBOUND_COMMAND_IDS)?;

        // 执行器总线只发不收，丢弃 RX 半边
        let actuator_adapter = SocketCanAdapter::new(actuator_iface)?;
        let (_actuator_rx, actuator_tx) = actuator_adapter.split()?;

        self.build_with_adapters(command_rx, command_tx, actuator_tx, pedal)
    }

    /// 用任意适配器实现构建（跨平台，测试用 mock 从这里注入）
    pub fn build_with_adapters<R, CT, AT, P>(
        self,
        command_rx: R,
        command_tx: CT,
        actuator_tx: AT,
        pedal: P,
    ) -> Result<BrakeEcu, DriverError>
    where
        R: RxAdapter + 'static,
        CT: TxAdapter + 'static,
        AT: TxAdapter + 'static,
        P: PedalSource + 'static,
    {
        let encoder = BrakeEncoder::new(self.actuator_id, self.max_dist, self.min_dist)?;
        let config = self.config.unwrap_or_default();
        BrakeEcu::new(command_rx, command_tx, actuator_tx, pedal, encoder, config)
    }
}

impl Default for BrakeEcuBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedalbox_can::CanError;
    use pedalbox_protocol::BusFrame;

    struct NullRx;
    impl RxAdapter for NullRx {
        fn receive(&mut self) -> Result<BusFrame, CanError> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            Err(CanError::Timeout)
        }
    }

    struct NullTx;
    impl TxAdapter for NullTx {
        fn send(&mut self, _frame: BusFrame) -> Result<(), CanError> {
            Ok(())
        }
    }

    struct NullPedal;
    impl PedalSource for NullPedal {
        fn read_raw(&mut self) -> std::io::Result<u16> {
            Ok(0)
        }
    }

    #[test]
    fn test_invalid_travel_range_rejected_at_build() {
        let result = BrakeEcuBuilder::new()
            .travel_range(100, 200)
            .build_with_adapters(NullRx, NullTx, NullTx, NullPedal);
        assert!(matches!(result, Err(DriverError::Protocol(_))));
    }

    #[test]
    fn test_defaults_build_and_shut_down() {
        let ecu = BrakeEcuBuilder::new()
            .build_with_adapters(NullRx, NullTx, NullTx, NullPedal)
            .unwrap();
        assert!(ecu.is_running());
        drop(ecu);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BrakeEcuBuilder::new()
            .config(EcuConfig {
                keep_alive_period_ms: 0,
                ..EcuConfig::default()
            })
            .build_with_adapters(NullRx, NullTx, NullTx, NullPedal);
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }
}
