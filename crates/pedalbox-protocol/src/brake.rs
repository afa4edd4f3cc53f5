//! 刹车位置指令帧编码
//!
//! [`BrakeEncoder`] 是本系统唯一有状态的协议组件：它持有最近一次下发的
//! 行程距离 `last_dist`（单位 0.001 英寸），并把百分比 / 网络指令字节 /
//! 保活重发统一翻译为执行器指令帧。
//!
//! ## 指令帧布局（运动控制帧）
//!
//! | 字节 | 含义 |
//! |---|---|
//! | 0 | `0x0F`（运动控制帧头） |
//! | 1 | `0x4A`（运动控制帧头） |
//! | 2 | `last_dist` 低 8 位 |
//! | 3 | `last_dist` 高 8 位，bit7/bit6 置位（离合器与电机使能） |
//! | 4-7 | 补零 |
//!
//! 自动归零（指令字节 0xFF）不走上述布局，而是发送执行器固件约定的
//! 固定哨兵载荷 [`AUTO_ZERO_PAYLOAD`]。

use crate::{BusFrame, ProtocolError};

/// 运动控制帧头（字节 0 / 字节 1）
pub const MOTION_HEADER: [u8; 2] = [0x0F, 0x4A];

/// 距离高字节上的离合器 + 电机使能位（bit7 | bit6）
pub const ENABLE_BITS: u8 = 0xC0;

/// 自动归零哨兵载荷（执行器固件约定的固定字节序列）
pub const AUTO_ZERO_PAYLOAD: [u8; 8] = [0x7E, 0x02, 0x12, 0x34, 0x56, 0xAB, 0xCD, 0xEF];

/// 网络指令字节中表示自动归零的哨兵值
pub const AUTO_ZERO_BYTE: u8 = 0xFF;

/// 百分比到距离换算中的固定偏移（单位 0.001 英寸）
const DIST_OFFSET: u16 = 500;

/// 刹车编码输入
///
/// 原实现按输入形态重载编码操作（原始 CAN 报文 / 裸百分比 / 无输入重发），
/// 这里统一为带标签的变体，经由 [`BrakeEncoder::encode`] 单点分发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrakeInput {
    /// 网络指令字节：0-100 为百分比，0xFF 为自动归零，其余无效
    NetworkByte(u8),
    /// 本地踏板百分比（调用方负责范围检查，编码器不再校验）
    Percent(u8),
    /// 按当前 `last_dist` 重发，不改变状态（保活路径）
    Repeat,
}

/// 刹车执行器指令编码器
///
/// 单实例、进程生命周期，启动时以固定配置构造一次。
/// 多线程共享时必须放在互斥锁内：每次编码都是对 `last_dist` 的
/// 读-改-写序列，撕裂的读取会把执行器推到错误位置。
#[derive(Debug)]
pub struct BrakeEncoder {
    /// 出站执行器帧使用的总线 ID（构造后不可变）
    actuator_id: u32,
    /// 最小行程（0.001 英寸）
    min_dist: u16,
    /// 最大行程（0.001 英寸），严格大于 `min_dist`
    max_dist: u16,
    /// 最近一次下发的行程距离
    last_dist: u16,
}

impl BrakeEncoder {
    /// 创建编码器
    ///
    /// # Errors
    /// - `ProtocolError::InvalidTravelRange`: `max_dist <= min_dist`。
    ///   这是不可恢复的配置错误，调用方（builder）应让进程拒绝启动。
    pub fn new(actuator_id: u32, max_dist: u16, min_dist: u16) -> Result<Self, ProtocolError> {
        if max_dist <= min_dist {
            return Err(ProtocolError::InvalidTravelRange { max_dist, min_dist });
        }

        Ok(Self {
            actuator_id,
            min_dist,
            max_dist,
            last_dist: min_dist,
        })
    }

    /// 统一编码入口：按输入变体分发
    pub fn encode(&mut self, input: BrakeInput) -> Result<BusFrame, ProtocolError> {
        match input {
            BrakeInput::NetworkByte(raw) => self.from_network_byte(raw),
            BrakeInput::Percent(percent) => Ok(self.from_percent(percent)),
            BrakeInput::Repeat => Ok(self.repeat()),
        }
    }

    /// 基于踏板百分比生成指令帧
    ///
    /// `last_dist = round(percent/100 * (max_dist - min_dist) + min_dist + 500)`
    ///
    /// 不校验 `percent` 范围：踏板换算可能产生超过 100 的值，
    /// 调用方决定是否截断（与原实现一致）。
    pub fn from_percent(&mut self, percent: u8) -> BusFrame {
        let span = (self.max_dist - self.min_dist) as f32;
        let dist = (percent as f32 / 100.0) * span + self.min_dist as f32 + DIST_OFFSET as f32;
        self.last_dist = dist.round() as u16;
        self.motion_frame()
    }

    /// 基于网络指令字节生成指令帧
    ///
    /// - `0..=100`: 等同 [`Self::from_percent`]
    /// - `0xFF`: 自动归零，`last_dist` 复位到 `min_dist`，返回哨兵帧
    /// - `101..=254`: 返回错误，不改变状态，不产生帧
    pub fn from_network_byte(&mut self, raw: u8) -> Result<BusFrame, ProtocolError> {
        if raw == AUTO_ZERO_BYTE {
            self.last_dist = self.min_dist;
            return Ok(BusFrame::new_extended(self.actuator_id, &AUTO_ZERO_PAYLOAD));
        }

        if raw > 100 {
            return Err(ProtocolError::InvalidPercent { value: raw });
        }

        Ok(self.from_percent(raw))
    }

    /// 按当前 `last_dist` 重发指令帧，不改变状态
    ///
    /// 保活调度器用它周期性重发上一条指令，防止执行器休眠。
    pub fn repeat(&self) -> BusFrame {
        self.motion_frame()
    }

    /// 将 `last_dist` 复位到最小行程，不产生帧（解锁路径）
    pub fn reset_to_min(&mut self) {
        self.last_dist = self.min_dist;
    }

    /// 当前下发的行程距离
    pub fn last_dist(&self) -> u16 {
        self.last_dist
    }

    /// 配置的最小行程
    pub fn min_dist(&self) -> u16 {
        self.min_dist
    }

    /// 按当前 `last_dist` 构建运动控制帧
    fn motion_frame(&self) -> BusFrame {
        let payload = [
            MOTION_HEADER[0],
            MOTION_HEADER[1],
            (self.last_dist & 0x00FF) as u8,
            ((self.last_dist >> 8) as u8) | ENABLE_BITS,
            0,
            0,
            0,
            0,
        ];
        BusFrame::new_extended(self.actuator_id, &payload)
    }
}
