//! # Pedalbox CLI
//!
//! 刹车执行器网关的命令行启动器：打开两条 SocketCAN 总线和踏板 ADC，
//! 启动网关后台线程，然后挂起等待 Ctrl-C。
//!
//! ```bash
//! # 使用默认接口（can0 指令总线 / can1 执行器总线）
//! pedalbox-cli
//!
//! # 显式指定接口与行程
//! pedalbox-cli --command-interface vcan0 --actuator-interface vcan1 \
//!     --max-dist 2000 --min-dist 0
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use pedalbox_driver::BrakeEcuBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

mod adc;
mod config;

use adc::IioPedalSource;
use config::FileConfig;

/// Pedalbox CLI - 刹车执行器网关
#[derive(Parser, Debug)]
#[command(name = "pedalbox-cli")]
#[command(about = "Brake actuator gateway over dual CAN buses", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/pedalbox/config.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 指令总线 SocketCAN 接口
    #[arg(long)]
    command_interface: Option<String>,

    /// 执行器总线 SocketCAN 接口
    #[arg(long)]
    actuator_interface: Option<String>,

    /// 执行器指令帧 CAN ID
    #[arg(long)]
    actuator_id: Option<u32>,

    /// 最大行程（0.001 英寸）
    #[arg(long)]
    max_dist: Option<u16>,

    /// 最小行程（0.001 英寸）
    #[arg(long)]
    min_dist: Option<u16>,

    /// 踏板 ADC 的 IIO sysfs 路径
    #[arg(long)]
    pedal_device: Option<PathBuf>,
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pedalbox_cli=info".parse().unwrap())
                .add_directive("pedalbox_driver=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let file = FileConfig::load(cli.config.as_deref())?;

    // 命令行参数优先于配置文件
    let command_interface = cli
        .command_interface
        .or(file.command_interface.clone())
        .unwrap_or_else(|| "can0".to_string());
    let actuator_interface = cli
        .actuator_interface
        .or(file.actuator_interface.clone())
        .unwrap_or_else(|| "can1".to_string());
    let actuator_id = cli.actuator_id.or(file.actuator_id).unwrap_or(0xFF0000);
    let max_dist = cli.max_dist.or(file.max_dist).unwrap_or(2000);
    let min_dist = cli.min_dist.or(file.min_dist).unwrap_or(0);
    let pedal_device = cli
        .pedal_device
        .or(file.pedal_device.clone())
        .unwrap_or_else(|| {
            PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage0_raw")
        });

    info!(
        "Starting gateway: command bus {}, actuator bus {}, actuator id 0x{:X}, travel {}-{}",
        command_interface, actuator_interface, actuator_id, min_dist, max_dist
    );

    let pedal = IioPedalSource::new(&pedal_device)
        .with_context(|| format!("Failed to open pedal ADC: {}", pedal_device.display()))?;

    let ecu = BrakeEcuBuilder::new()
        .command_interface(command_interface)
        .actuator_interface(actuator_interface)
        .actuator_id(actuator_id)
        .travel_range(max_dist, min_dist)
        .config(file.ecu_config())
        .build(pedal)
        .context("Failed to start brake gateway")?;

    // Ctrl-C 优雅退出
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        info!("Received Ctrl-C, shutting down");
        running_clone.store(false, Ordering::Release);
    })
    .context("Failed to set Ctrl-C handler")?;

    while running.load(Ordering::Acquire) {
        if !ecu.is_healthy() {
            error!("Gateway thread failure detected, shutting down");
            drop(ecu);
            std::process::exit(1);
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(ecu);
    info!("Gateway stopped");
    Ok(())
}
