//! 踏板采样与换算
//!
//! 踏板位置传感器经分压电路接在一路 10-bit ADC 上。
//! 每个采样周期：原始读数 → 电压 → 推算电阻 → 刹车百分比，
//! 然后按训练镜像 / KillAuton / 执行器驱动三条路径产出帧。
//!
//! 换算链与死区判定是纯函数，采样线程只负责调度与通道投递。

use crate::error::DriverError;
use crate::router::EcuContext;
use pedalbox_protocol::BusFrame;
use pedalbox_protocol::ids::{ID_KILL_AUTON, ID_SET_BRAKE};

/// ADC 满量程码值（10-bit）
pub const ADC_MAX_CODE: u16 = 1023;

/// ADC 满量程电压
pub const ADC_FULL_SCALE_VOLTS: f32 = 3.3;

/// 踏板采样源
///
/// 生产环境由 IIO sysfs ADC 实现；测试中用脚本化的序列替代。
pub trait PedalSource: Send {
    /// 读取一次原始 ADC 码值（0-1023）
    fn read_raw(&mut self) -> std::io::Result<u16>;
}

/// 原始码值换算为电压（0..1023 映射到 0.0V..3.3V）
pub fn raw_to_volts(raw: u16) -> f32 {
    raw as f32 * (ADC_FULL_SCALE_VOLTS / ADC_MAX_CODE as f32)
}

/// 电压换算为传感器电阻（分压电路模型）
pub fn volts_to_ohms(volts: f32) -> f32 {
    -(7500.0 * volts) / (volts - 5.0)
}

/// 电阻换算为刹车百分比（截断为 u8，超量程读数饱和）
pub fn ohms_to_percent(ohms: f32) -> u8 {
    ((ohms / 5000.0) * 100.0) as u8
}

/// 完整换算链：原始码值 → 百分比
pub fn percent_from_raw(raw: u16) -> u8 {
    ohms_to_percent(volts_to_ohms(raw_to_volts(raw)))
}

/// 单次采样的产出帧
///
/// 三条路径相互独立：镜像只看训练模式，KillAuton 与执行器驱动只看死区。
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SampleOutput {
    /// 训练镜像帧（SetBrake 形状，发往指令总线）
    pub mirror: Option<BusFrame>,
    /// 一次性 KillAuton 帧（发往指令总线）
    pub kill_auton: Option<BusFrame>,
    /// 执行器指令帧（发往执行器总线）
    pub actuator: Option<BusFrame>,
}

/// 处理一个踏板百分比采样
///
/// - 训练模式下每个采样都镜像到指令总线（包括 0），镜像不碰编码器
/// - 越过死区时：本次踩踏事件首个采样发一条 KillAuton，
///   并驱动编码器产出执行器帧。锁定与训练模式都不拦截这条路径，
///   踏板对执行器始终有直接物理控制权
///
/// # Errors
/// - `DriverError::PoisonedLock`: 编码器锁被毒化
pub fn sample_step(
    ctx: &EcuContext,
    percent: u8,
    deadband: u8,
) -> Result<SampleOutput, DriverError> {
    let mut output = SampleOutput::default();

    if ctx.modes.is_training() {
        output.mirror = Some(BusFrame::new_extended(ID_SET_BRAKE, &[percent]));
    }

    if percent > deadband {
        if !ctx.modes.auton_disabled() {
            ctx.modes.set_auton_disabled(true);
            output.kill_auton = Some(BusFrame::new_extended(ID_KILL_AUTON, &[]));
        }

        let mut encoder = ctx.encoder.lock().map_err(|_| DriverError::PoisonedLock)?;
        output.actuator = Some(encoder.from_percent(percent));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pedalbox_protocol::BrakeEncoder;

    const DEADBAND: u8 = 5;

    fn ctx() -> EcuContext {
        EcuContext::new(BrakeEncoder::new(0xFF0000, 2000, 0).unwrap())
    }

    #[test]
    fn test_conversion_chain_at_one_volt() {
        // 310/1023 * 3.3 正好是 1.0V → 1875Ω → 37%
        let volts = raw_to_volts(310);
        assert!((volts - 1.0).abs() < 1e-6);
        let ohms = volts_to_ohms(volts);
        assert!((ohms - 1875.0).abs() < 1e-2);
        assert_eq!(percent_from_raw(310), 37);
    }

    #[test]
    fn test_conversion_chain_endpoints() {
        assert_eq!(percent_from_raw(0), 0);
        // 满量程 3.3V → 14558.8Ω → 291.2%，截断饱和到 255
        assert_eq!(percent_from_raw(1023), 255);
    }

    #[test]
    fn test_percent_monotonic_in_raw() {
        let mut prev = 0u8;
        for raw in (0..=1023).step_by(7) {
            let percent = percent_from_raw(raw);
            assert!(percent >= prev, "percent must not decrease (raw {})", raw);
            prev = percent;
        }
    }

    #[test]
    fn test_below_deadband_produces_nothing() {
        let ctx = ctx();
        for percent in 0..=DEADBAND {
            let output = sample_step(&ctx, percent, DEADBAND).unwrap();
            assert_eq!(output, SampleOutput::default());
        }
        assert_eq!(ctx.encoder.lock().unwrap().last_dist(), 0);
        assert!(!ctx.modes.auton_disabled());
    }

    #[test]
    fn test_kill_auton_fires_once_per_press() {
        let ctx = ctx();

        let first = sample_step(&ctx, 40, DEADBAND).unwrap();
        let kill = first.kill_auton.expect("first press must emit KillAuton");
        assert_eq!(kill.id(), ID_KILL_AUTON);
        assert!(first.actuator.is_some());

        // 同一次踩踏的后续采样不再发 KillAuton
        let second = sample_step(&ctx, 45, DEADBAND).unwrap();
        assert!(second.kill_auton.is_none());
        assert!(second.actuator.is_some());
    }

    #[test]
    fn test_pedal_bypasses_lock_and_training() {
        let ctx = ctx();
        ctx.modes.lock();
        ctx.modes.enter_training();

        let output = sample_step(&ctx, 60, DEADBAND).unwrap();
        let frame = output.actuator.expect("pedal must override lock/training");
        assert_eq!(frame.data_slice()[..2], [0x0F, 0x4A]);
        assert_eq!(ctx.encoder.lock().unwrap().last_dist(), 1700);
    }

    #[test]
    fn test_training_mirrors_every_sample() {
        let ctx = ctx();
        ctx.modes.enter_training();

        // 包括死区内与零值采样
        for percent in [0u8, 3, 50] {
            let output = sample_step(&ctx, percent, DEADBAND).unwrap();
            let mirror = output.mirror.expect("training must mirror each sample");
            assert_eq!(mirror.id(), ID_SET_BRAKE);
            assert_eq!(mirror.data_slice(), &[percent]);
        }

        // 镜像本身不碰编码器
        let output = sample_step(&ctx, 3, DEADBAND).unwrap();
        assert!(output.actuator.is_none());
        assert_eq!(ctx.encoder.lock().unwrap().last_dist(), 1500);
    }

    #[test]
    fn test_no_mirror_outside_training() {
        let ctx = ctx();
        let output = sample_step(&ctx, 50, DEADBAND).unwrap();
        assert!(output.mirror.is_none());
    }
}
