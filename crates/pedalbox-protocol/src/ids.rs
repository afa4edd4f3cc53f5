//! 指令总线 CAN ID 定义
//!
//! 高优先级指令总线上的报文按 CAN ID 区分指令类型，载荷最多 1 字节。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 自主驾驶切断信号（仅出站，踏板被踩下时单次发送）
pub const ID_KILL_AUTON: u32 = 0x0;

/// 设置刹车位置（载荷字节 0：百分比 0-100，或 0xFF 自动归零）
pub const ID_SET_BRAKE: u32 = 0x1;

/// 锁定刹车（后续 SetBrake 被忽略，直到解锁）
pub const ID_LOCK_BRAKE: u32 = 0x2;

/// 解锁刹车（并将编码器复位到最小行程）
pub const ID_UNLOCK_BRAKE: u32 = 0x3;

/// 进入训练模式（单向锁存，重启前无法退出）
pub const ID_TRAINING_MODE: u32 = 0x8;

/// 指令总线报文类型
///
/// 使用 `TryFromPrimitive` 从入站帧的 CAN ID 解析；
/// 未知 ID 在路由层作为无效指令记录并忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum CommandId {
    KillAuton = ID_KILL_AUTON,
    SetBrake = ID_SET_BRAKE,
    LockBrake = ID_LOCK_BRAKE,
    UnlockBrake = ID_UNLOCK_BRAKE,
    TrainingMode = ID_TRAINING_MODE,
}

/// 路由层需要接收的入站指令 ID（用于配置 RX 硬件过滤器）
pub const INBOUND_COMMAND_IDS: [u32; 4] =
    [ID_SET_BRAKE, ID_LOCK_BRAKE, ID_UNLOCK_BRAKE, ID_TRAINING_MODE];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_roundtrip() {
        assert_eq!(CommandId::try_from(0x1), Ok(CommandId::SetBrake));
        assert_eq!(CommandId::try_from(0x2), Ok(CommandId::LockBrake));
        assert_eq!(CommandId::try_from(0x3), Ok(CommandId::UnlockBrake));
        assert_eq!(CommandId::try_from(0x8), Ok(CommandId::TrainingMode));
        assert_eq!(u32::from(CommandId::KillAuton), 0x0);
    }

    #[test]
    fn test_unknown_command_id_rejected() {
        assert!(CommandId::try_from(0x4u32).is_err());
        assert!(CommandId::try_from(0x7FFu32).is_err());
    }

    #[test]
    fn test_inbound_ids_exclude_kill_auton() {
        assert!(!INBOUND_COMMAND_IDS.contains(&ID_KILL_AUTON));
    }
}
