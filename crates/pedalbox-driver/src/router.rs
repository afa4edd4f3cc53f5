//! 指令路由器
//!
//! 消费指令总线上的入站帧，按 `(training_mode, brake_lock)` 状态机
//! 决定是否调用 [`BrakeEncoder`] 并把结果帧投递到执行器 TX 通道。
//!
//! ## 路由表
//!
//! | 入站 ID | 前置条件 | 效果 |
//! |---|---|---|
//! | TrainingMode | 训练模式未开启 | 单向锁存训练模式 |
//! | SetBrake | 未训练且未锁定 | 清 `auton_disabled`，载荷字节交给编码器，结果帧上执行器总线 |
//! | SetBrake | 训练中或已锁定 | 完全忽略（不改状态，不发帧） |
//! | LockBrake | — | 锁定 |
//! | UnlockBrake | — | 解锁，编码器复位到最小行程 |
//! | 其他 | — | 记录无效指令，忽略 |

use crate::error::DriverError;
use crate::mode::ModeFlags;
use crossbeam_channel::Sender;
use pedalbox_protocol::ids::CommandId;
use pedalbox_protocol::{BrakeEncoder, BusFrame, ProtocolError};
use std::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// 入站 ID 的匹配掩码
///
/// RX 硬件过滤器按低 11 位放行，路由时按同一掩码取 ID，
/// 发送端用标准帧或扩展帧携带同一指令 ID 都能命中。
const COMMAND_ID_MASK: u32 = 0x7FF;

/// 线程间共享的网关状态
///
/// 编码器的每次调用都是对 `last_dist` 的读-改-写序列，放在互斥锁内；
/// 模式标志各自独立，用原子变量即可。
#[derive(Debug)]
pub struct EcuContext {
    /// 刹车指令编码器（路由器 / 保活 / 踏板三方共享）
    pub encoder: Mutex<BrakeEncoder>,
    /// 模式标志
    pub modes: ModeFlags,
}

impl EcuContext {
    /// 创建共享状态上下文
    pub fn new(encoder: BrakeEncoder) -> Self {
        Self {
            encoder: Mutex::new(encoder),
            modes: ModeFlags::new(),
        }
    }
}

/// 处理一条入站指令帧
///
/// 产生的执行器帧通过 `actuator_tx` 投递给执行器总线 TX 线程。
///
/// # Errors
/// - `DriverError::Protocol`: 未知指令 ID、越界载荷字节或空载荷。
///   这些都是可恢复错误，调用方记录后继续处理后续帧。
/// - `DriverError::ChannelClosed`: 执行器 TX 通道断开，接收循环应退出。
/// - `DriverError::PoisonedLock`: 编码器锁被毒化。
pub fn route_command(
    ctx: &EcuContext,
    frame: &BusFrame,
    actuator_tx: &Sender<BusFrame>,
) -> Result<(), DriverError> {
    let raw_id = frame.id() & COMMAND_ID_MASK;
    let Ok(command) = CommandId::try_from(raw_id) else {
        return Err(ProtocolError::InvalidCommandId { id: frame.id() }.into());
    };

    match command {
        CommandId::TrainingMode => {
            if !ctx.modes.is_training() {
                ctx.modes.enter_training();
                info!("Training mode latched, network brake commands suppressed");
            } else {
                trace!("Training mode already latched, ignoring");
            }
            Ok(())
        },
        CommandId::SetBrake => {
            if ctx.modes.is_training() || ctx.modes.is_locked() {
                trace!(
                    "SetBrake ignored (training: {}, locked: {})",
                    ctx.modes.is_training(),
                    ctx.modes.is_locked()
                );
                return Ok(());
            }

            let Some(&raw) = frame.data_slice().first() else {
                return Err(ProtocolError::InvalidLength {
                    expected: 1,
                    actual: 0,
                }
                .into());
            };

            // 远程控制恢复，清掉上一次踩踏事件的 KillAuton 标志
            ctx.modes.set_auton_disabled(false);

            let act_frame = {
                let mut encoder = ctx.encoder.lock().map_err(|_| DriverError::PoisonedLock)?;
                encoder.from_network_byte(raw)?
            };

            debug!("SetBrake({}) routed to actuator", raw);
            actuator_tx
                .send(act_frame)
                .map_err(|_| DriverError::ChannelClosed)
        },
        CommandId::LockBrake => {
            ctx.modes.lock();
            info!("Brake locked, inbound SetBrake suppressed until unlock");
            Ok(())
        },
        CommandId::UnlockBrake => {
            {
                let mut encoder = ctx.encoder.lock().map_err(|_| DriverError::PoisonedLock)?;
                encoder.reset_to_min();
            }
            ctx.modes.unlock();
            info!("Brake unlocked, encoder reset to minimum travel");
            Ok(())
        },
        CommandId::KillAuton => {
            // KillAuton 只出站，入站视为无效指令
            warn!("Received outbound-only CAN id 0x0 from priority bus, ignoring");
            Err(ProtocolError::InvalidCommandId { id: frame.id() }.into())
        },
    }
}
