//! # Pedalbox Protocol
//!
//! 刹车执行器 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 指令总线 CAN ID 定义
//! - `brake`: 刹车位置指令帧编码（`BrakeEncoder`）
//!
//! ## 帧格式
//!
//! 执行器指令帧为固定 8 字节载荷（有效数据 4 字节，其余补零），
//! 距离字段为小端（低字节在前），详见 [`brake`] 模块。

pub mod brake;
pub mod ids;

pub use brake::{AUTO_ZERO_PAYLOAD, BrakeEncoder, BrakeInput};
pub use ids::CommandId;

use thiserror::Error;

/// CAN 2.0 标准帧的统一抽象
///
/// 协议层和硬件层之间的中间抽象：协议层不依赖底层 CAN 实现，
/// 上层通过 `CanAdapter` trait 使用统一的帧类型。
///
/// - **Copy trait**：零成本复制，适合高频场景（踏板采样 10kHz）
/// - **固定 8 字节**：避免堆分配
/// - **无生命周期**：自包含数据结构
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,
}

impl BusFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 获取完整数据（8 字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }
}

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 指令字节超出 `[0,100] ∪ {0xFF}`
    #[error("Brake percent out of range: {value} (expected 0-100 or 0xFF)")]
    InvalidPercent { value: u8 },

    /// 行程配置非法（max 必须严格大于 min）
    #[error("Invalid travel range: max_dist ({max_dist}) must be greater than min_dist ({min_dist})")]
    InvalidTravelRange { max_dist: u16, min_dist: u16 },

    /// 未知的指令总线 CAN ID
    #[error("Invalid command CAN ID: 0x{id:X}")]
    InvalidCommandId { id: u32 },

    /// 帧载荷长度不足
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
