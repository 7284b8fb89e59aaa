//! LPC17xx 系列 UART 的中断驱动串口驱动
//!
//! 应用线程通过输入/输出字节队列与中断服务程序共享一个硬件串口：
//! - 写入：应用 → 输出队列 → 预装载（首个字节）或 THRE 中断（后续字节）→ 硬件 FIFO
//! - 读取：硬件 FIFO → 中断 RX 排空 → 输入队列 → 应用
//! - 错误：LSR → 错误汇总 → 通道标志位 → 应用轮询
//!
//! 寄存器访问通过 [`UartRegisters`] 抽象，真实硬件使用 [`lpc17xx::Mmio`]，
//! 主机测试使用 `sim::SimUart`（`sim` feature）。

#![cfg_attr(not(test), no_std)]

mod channel;
mod config;
mod driver;
mod flags;
mod port;
mod queue;
mod regs;

pub mod lpc17xx;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use channel::{Channel, ChannelState, ChannelWriter};
pub use config::{Config, DataBits, FifoTrigger, Parity, StopBits};
pub use driver::SerialDriver;
pub use flags::{ChannelFlags, EventFlags};
pub use port::{
    ClockControl, ClockDivider, InterruptController, Irq, PinMux, Platform, PortDescriptor,
    PortId,
};
pub use queue::{ByteQueue, QueueHook};
pub use regs::{InterruptEnable, InterruptSource, LineStatus, Reg, UartRegisters};

// ============================================================================
// 常量
// ============================================================================

/// 单次预装载 / 中断补充最多搬运的字节数（硬件 TX FIFO 深度）
pub const FIFO_DEPTH: usize = 16;

/// 输入/输出队列默认容量
pub const SERIAL_BUFFERS_SIZE: usize = 16;

/// 注册表默认可容纳的端口数
pub const MAX_PORTS: usize = 4;

// ============================================================================
// 错误类型定义
// ============================================================================

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// 端口未在注册表中
    #[error("port {0:?} is not registered")]
    UnknownPort(PortId),
    /// 同一端口被注册两次
    #[error("port {0:?} registered twice")]
    DuplicatePort(PortId),
    /// 端口描述中的寄存器块基地址无效
    #[error("port {0:?} has no register block")]
    InvalidBase(PortId),
    /// 注册表已满
    #[error("serial registry is full")]
    RegistryFull,
    /// 波特率无法由当前外设时钟分频得到
    #[error("baud rate {0} cannot be derived from the peripheral clock")]
    InvalidBaudrate(u32),
    /// 通道未启动
    #[error("channel is stopped")]
    NotReady,
    /// 队列已满
    #[error("queue is full")]
    QueueFull,
}
