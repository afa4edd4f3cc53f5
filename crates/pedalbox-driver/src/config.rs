//! 网关配置
//!
//! 控制各后台线程的周期与接收超时。

/// 网关线程配置
///
/// # Example
///
/// ```
/// use pedalbox_driver::EcuConfig;
///
/// // 使用默认配置（100ms 保活周期，100µs 踏板采样周期）
/// let config = EcuConfig::default();
///
/// // 自定义配置
/// let config = EcuConfig {
///     keep_alive_period_ms: 50,
///     ..EcuConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuConfig {
    /// 保活重发周期（毫秒）
    pub keep_alive_period_ms: u64,
    /// 踏板采样周期（微秒）
    pub pedal_period_us: u64,
    /// 指令总线 CAN 接收超时（毫秒）
    pub receive_timeout_ms: u64,
    /// 踏板死区阈值（百分比），低于此值的踏板读数不驱动执行器
    pub deadband_percent: u8,
}

impl Default for EcuConfig {
    fn default() -> Self {
        Self {
            keep_alive_period_ms: 100,
            pedal_period_us: 100,
            receive_timeout_ms: 2,
            deadband_percent: 5,
        }
    }
}

impl EcuConfig {
    /// 校验配置（周期为 0 会让采样线程空转）
    pub fn validate(&self) -> Result<(), crate::DriverError> {
        if self.keep_alive_period_ms == 0 {
            return Err(crate::DriverError::InvalidConfig(
                "keep_alive_period_ms must be non-zero".to_string(),
            ));
        }
        if self.pedal_period_us == 0 {
            return Err(crate::DriverError::InvalidConfig(
                "pedal_period_us must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EcuConfig::default();
        assert_eq!(config.keep_alive_period_ms, 100);
        assert_eq!(config.pedal_period_us, 100);
        assert_eq!(config.receive_timeout_ms, 2);
        assert_eq!(config.deadband_percent, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_periods_rejected() {
        let config = EcuConfig {
            keep_alive_period_ms: 0,
            ..EcuConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EcuConfig {
            pedal_period_us: 0,
            ..EcuConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
