//! 踏板 ADC 读取
//!
//! 踏板位置传感器经 Linux IIO 子系统暴露为 sysfs 属性文件
//! （如 `/sys/bus/iio/devices/iio:device0/in_voltage0_raw`），
//! 每次读取返回一个十进制原始码值。

use pedalbox_driver::PedalSource;
use std::io;
use std::path::PathBuf;

/// IIO sysfs 踏板采样源
///
/// sysfs 属性文件每次 open+read 返回最新采样，不能缓存文件句柄
/// 复用偏移量，因此这里每个周期重新读取整个文件。
#[derive(Debug)]
pub struct IioPedalSource {
    path: PathBuf,
}

impl IioPedalSource {
    /// 创建采样源并做一次探测读取，通道不存在时立即报错
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let mut source = Self { path: path.into() };
        source.read_raw()?;
        Ok(source)
    }
}

impl PedalSource for IioPedalSource {
    fn read_raw(&mut self) -> io::Result<u16> {
        let content = std::fs::read_to_string(&self.path)?;
        content.trim().parse::<u16>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid ADC reading '{}': {}", content.trim(), e),
            )
        })
    }
}
