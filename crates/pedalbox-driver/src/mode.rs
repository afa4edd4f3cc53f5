//! 模式标志定义
//!
//! 三个跨线程共享的布尔模式位，控制路由器与踏板采样线程的行为。
//! 原子变量替代全局可变标志，所有读写使用 `Relaxed`：
//! 各标志彼此独立，没有需要跨标志建立的先行发生关系。

use std::sync::atomic::{AtomicBool, Ordering};

/// 进程级模式标志
///
/// # 标志说明
///
/// - **training_mode**: 训练模式。单向锁存，置位后网络刹车指令被抑制，
///   踏板采样把每次读数镜像到指令总线。进程重启前无法退出。
/// - **brake_lock**: 刹车锁定。置位后入站 SetBrake 被忽略；
///   踏板越过死区时仍有直接物理控制权。
/// - **auton_disabled**: 本次踩踏事件是否已发送过 KillAuton，
///   避免每个采样周期重复广播。
///
/// # 线程安全
///
/// 使用原子操作确保标志切换的线程安全性。
#[derive(Debug, Default)]
pub struct ModeFlags {
    training_mode: AtomicBool,
    brake_lock: AtomicBool,
    auton_disabled: AtomicBool,
}

impl ModeFlags {
    /// 创建模式标志（启动状态：全部为 false）
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否处于训练模式
    pub fn is_training(&self) -> bool {
        self.training_mode.load(Ordering::Relaxed)
    }

    /// 进入训练模式（单向锁存，没有对应的退出操作）
    pub fn enter_training(&self) {
        self.training_mode.store(true, Ordering::Relaxed);
    }

    /// 刹车是否被锁定
    pub fn is_locked(&self) -> bool {
        self.brake_lock.load(Ordering::Relaxed)
    }

    /// 锁定刹车
    pub fn lock(&self) {
        self.brake_lock.store(true, Ordering::Relaxed);
    }

    /// 解锁刹车
    pub fn unlock(&self) {
        self.brake_lock.store(false, Ordering::Relaxed);
    }

    /// 本次踩踏事件是否已发送 KillAuton
    pub fn auton_disabled(&self) -> bool {
        self.auton_disabled.load(Ordering::Relaxed)
    }

    /// 设置 KillAuton 已发送标志
    pub fn set_auton_disabled(&self, disabled: bool) {
        self.auton_disabled.store(disabled, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_start_cleared() {
        let flags = ModeFlags::new();
        assert!(!flags.is_training());
        assert!(!flags.is_locked());
        assert!(!flags.auton_disabled());
    }

    #[test]
    fn test_training_is_one_way_latch() {
        let flags = ModeFlags::new();
        flags.enter_training();
        assert!(flags.is_training());
        // 没有退出操作，重复进入是幂等的
        flags.enter_training();
        assert!(flags.is_training());
    }

    #[test]
    fn test_lock_unlock_round_trip() {
        let flags = ModeFlags::new();
        flags.lock();
        assert!(flags.is_locked());
        flags.unlock();
        assert!(!flags.is_locked());
    }

    #[test]
    fn test_auton_disabled_toggles() {
        let flags = ModeFlags::new();
        flags.set_auton_disabled(true);
        assert!(flags.auton_disabled());
        flags.set_auton_disabled(false);
        assert!(!flags.auton_disabled());
    }
}
