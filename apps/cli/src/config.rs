//! 配置文件加载
//!
//! 默认路径 `~/.config/pedalbox/config.toml`（可用 `--config` 覆盖），
//! 命令行参数优先于配置文件，两者都缺省时用内置默认值。
//!
//! ```toml
//! command_interface = "can0"
//! actuator_interface = "can1"
//! actuator_id = 0xFF0000
//! max_dist = 2000
//! min_dist = 0
//! pedal_device = "/sys/bus/iio/devices/iio:device0/in_voltage0_raw"
//!
//! [timing]
//! keep_alive_period_ms = 100
//! pedal_period_us = 100
//! receive_timeout_ms = 2
//! deadband_percent = 5
//! ```

use anyhow::{Context, Result};
use pedalbox_driver::EcuConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 配置文件结构（所有字段可省略）
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub command_interface: Option<String>,
    pub actuator_interface: Option<String>,
    pub actuator_id: Option<u32>,
    pub max_dist: Option<u16>,
    pub min_dist: Option<u16>,
    pub pedal_device: Option<PathBuf>,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// 线程周期配置段
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    pub keep_alive_period_ms: Option<u64>,
    pub pedal_period_us: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
    pub deadband_percent: Option<u8>,
}

impl FileConfig {
    /// 从给定路径加载；`None` 时尝试默认路径，文件不存在则返回默认配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// 默认配置文件路径（`~/.config/pedalbox/config.toml`）
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pedalbox").join("config.toml"))
    }

    /// 合并到驱动层线程配置（文件值覆盖内置默认）
    pub fn ecu_config(&self) -> EcuConfig {
        let defaults = EcuConfig::default();
        EcuConfig {
            keep_alive_period_ms: self
                .timing
                .keep_alive_period_ms
                .unwrap_or(defaults.keep_alive_period_ms),
            pedal_period_us: self
                .timing
                .pedal_period_us
                .unwrap_or(defaults.pedal_period_us),
            receive_timeout_ms: self
                .timing
                .receive_timeout_ms
                .unwrap_or(defaults.receive_timeout_ms),
            deadband_percent: self
                .timing
                .deadband_percent
                .unwrap_or(defaults.deadband_percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = FileConfig::load(None).unwrap();
        assert!(config.command_interface.is_none());
        assert_eq!(config.ecu_config(), EcuConfig::default());
    }

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
command_interface = "vcan0"
actuator_interface = "vcan1"
actuator_id = 0xFF0000
max_dist = 2500
min_dist = 100

[timing]
keep_alive_period_ms = 50
deadband_percent = 8
"#
        )
        .unwrap();

        let config = FileConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.command_interface.as_deref(), Some("vcan0"));
        assert_eq!(config.actuator_id, Some(0xFF0000));
        assert_eq!(config.max_dist, Some(2500));

        let ecu = config.ecu_config();
        assert_eq!(ecu.keep_alive_period_ms, 50);
        assert_eq!(ecu.deadband_percent, 8);
        // 未出现的字段落回默认值
        assert_eq!(ecu.pedal_period_us, 100);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not_a_real_field = 1").unwrap();
        assert!(FileConfig::load(Some(file.path())).is_err());
    }
}
