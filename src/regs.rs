//! UART 寄存器访问接口与位定义
//!
//! 寄存器布局与 16550 兼容（LPC17xx 在此基础上增加了 ACR/FDR/TER）。
//! 驱动只通过 [`UartRegisters`] 按寄存器读写，便于在主机上用模拟寄存器块测试。

#![allow(dead_code)]

use bitflags::bitflags;

/// UART 寄存器选择
///
/// 部分寄存器共享偏移：RBR/THR/DLL 位于 0x00，IER/DLM 位于 0x04，
/// IIR/FCR 位于 0x08；由 LCR.DLAB 和读写方向决定实际访问的寄存器。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// 接收缓冲寄存器，只读
    Rbr,
    /// 发送保持寄存器，只写
    Thr,
    /// 除数锁存低字节，需 DLAB=1
    Dll,
    /// 除数锁存高字节，需 DLAB=1
    Dlm,
    /// 中断使能寄存器
    Ier,
    /// 中断标识寄存器，只读
    Iir,
    /// FIFO 控制寄存器，只写
    Fcr,
    /// 线路控制寄存器
    Lcr,
    /// 线路状态寄存器，只读，读取清除错误位
    Lsr,
    /// 临时寄存器
    Scr,
    /// 自动波特率控制寄存器
    Acr,
    /// 小数分频寄存器
    Fdr,
    /// 发送使能寄存器
    Ter,
}

impl Reg {
    /// 相对于寄存器块基地址的字节偏移
    pub const fn offset(self) -> usize {
        match self {
            Reg::Rbr | Reg::Thr | Reg::Dll => 0x00,
            Reg::Ier | Reg::Dlm => 0x04,
            Reg::Iir | Reg::Fcr => 0x08,
            Reg::Lcr => 0x0C,
            Reg::Lsr => 0x14,
            Reg::Scr => 0x1C,
            Reg::Acr => 0x20,
            Reg::Fdr => 0x28,
            Reg::Ter => 0x30,
        }
    }
}

// IER (Interrupt Enable Register) 位定义
pub const IER_RBR: u32 = 0x01; // Receive Data Available
pub const IER_THRE: u32 = 0x02; // Transmit Holding Register Empty
pub const IER_STATUS: u32 = 0x04; // Receive Line Status

// IIR (Interrupt Identification Register) 位定义
pub const IIR_SRC_MASK: u32 = 0x0F;
pub const IIR_SRC_NONE: u32 = 0x01; // No interrupts pending
pub const IIR_SRC_MODEM: u32 = 0x00;
pub const IIR_SRC_TX: u32 = 0x02;
pub const IIR_SRC_RX: u32 = 0x04;
pub const IIR_SRC_ERROR: u32 = 0x06;
pub const IIR_SRC_TIMEOUT: u32 = 0x0C;
pub const IIR_FIFO_ENABLED: u32 = 0xC0;

// FCR (FIFO Control Register) 位定义
pub const FCR_ENABLE: u8 = 0x01;
pub const FCR_RXRESET: u8 = 0x02;
pub const FCR_TXRESET: u8 = 0x04;
pub const FCR_TRIGGER0: u8 = 0x00; // 1 byte
pub const FCR_TRIGGER1: u8 = 0x40; // 4 bytes
pub const FCR_TRIGGER2: u8 = 0x80; // 8 bytes
pub const FCR_TRIGGER3: u8 = 0xC0; // 14 bytes
pub const FCR_TRIGGER_MASK: u8 = 0xC0;

// LCR (Line Control Register) 位定义
pub const LCR_WL5: u8 = 0x00;
pub const LCR_WL6: u8 = 0x01;
pub const LCR_WL7: u8 = 0x02;
pub const LCR_WL8: u8 = 0x03;
pub const LCR_WLEN_MASK: u8 = 0x03;
pub const LCR_STOP1: u8 = 0x00;
pub const LCR_STOP2: u8 = 0x04;
pub const LCR_NOPARITY: u8 = 0x00;
pub const LCR_PARITY_ODD: u8 = 0x08;
pub const LCR_PARITY_EVEN: u8 = 0x18;
pub const LCR_PARITY_MARK: u8 = 0x28; // 强制为 1
pub const LCR_PARITY_SPACE: u8 = 0x38; // 强制为 0
pub const LCR_PARITY_MASK: u8 = 0x38;
pub const LCR_BREAK: u8 = 0x40;
/// 字长、停止位、校验
pub const LCR_FRAME_MASK: u8 = LCR_WLEN_MASK | LCR_STOP2 | LCR_PARITY_MASK;
pub const LCR_DLAB: u8 = 0x80;

// FDR: DIVADDVAL = 0, MULVAL = 1，即不做小数分频
pub const FDR_PASSTHROUGH: u32 = 0x10;

// TER: 发送使能
pub const TER_ENABLE: u32 = 0x80;

bitflags! {
    /// 中断使能位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptEnable: u32 {
        const RX_AVAILABLE = IER_RBR;
        const TX_EMPTY = IER_THRE;
        const RX_LINE_STATUS = IER_STATUS;
    }
}

bitflags! {
    /// 线路状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u32 {
        const DATA_READY = 0x01;
        const OVERRUN_ERROR = 0x02;
        const PARITY_ERROR = 0x04;
        const FRAMING_ERROR = 0x08;
        const BREAK_INTERRUPT = 0x10;
        const TX_HOLDING_EMPTY = 0x20;
        const TX_EMPTY = 0x40;
        const FIFO_ERROR = 0x80;
    }
}

impl LineStatus {
    pub const ERRORS: LineStatus = LineStatus::OVERRUN_ERROR
        .union(LineStatus::PARITY_ERROR)
        .union(LineStatus::FRAMING_ERROR)
        .union(LineStatus::BREAK_INTERRUPT);

    pub fn can_read(&self) -> bool {
        self.contains(LineStatus::DATA_READY)
    }

    pub fn can_write(&self) -> bool {
        self.contains(LineStatus::TX_HOLDING_EMPTY)
    }
}

/// IIR 解码后的中断源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    /// 没有挂起的中断
    None,
    /// 接收线路状态（溢出/校验/帧错误/断线）
    LineStatus,
    /// 接收数据达到触发级别
    RxData,
    /// 字符超时
    RxTimeout,
    /// THR 空
    TxEmpty,
    /// 其他来源（如调制解调器状态），携带原始 IIR 源字段
    Other(u8),
}

impl InterruptSource {
    pub fn decode(iir: u32) -> Self {
        match iir & IIR_SRC_MASK {
            IIR_SRC_NONE => InterruptSource::None,
            IIR_SRC_ERROR => InterruptSource::LineStatus,
            IIR_SRC_RX => InterruptSource::RxData,
            IIR_SRC_TIMEOUT => InterruptSource::RxTimeout,
            IIR_SRC_TX => InterruptSource::TxEmpty,
            other => InterruptSource::Other(other as u8),
        }
    }
}

/// 按寄存器读写的 UART 访问接口
pub trait UartRegisters {
    /// 读取寄存器（读取 RBR/IIR/LSR 可能有副作用）
    fn read_reg(&self, reg: Reg) -> u32;
    /// 写入寄存器
    fn write_reg(&self, reg: Reg, val: u32);

    fn line_status(&self) -> LineStatus {
        LineStatus::from_bits_retain(self.read_reg(Reg::Lsr))
    }

    fn interrupt_source(&self) -> InterruptSource {
        InterruptSource::decode(self.read_reg(Reg::Iir))
    }

    fn interrupt_enable(&self) -> InterruptEnable {
        InterruptEnable::from_bits_truncate(self.read_reg(Reg::Ier))
    }

    fn set_interrupt_enable(&self, mask: InterruptEnable) {
        self.write_reg(Reg::Ier, mask.bits());
    }

    fn enable_interrupts(&self, mask: InterruptEnable) {
        self.set_interrupt_enable(self.interrupt_enable() | mask);
    }

    fn disable_interrupts(&self, mask: InterruptEnable) {
        self.set_interrupt_enable(self.interrupt_enable() - mask);
    }
}

impl<T: UartRegisters + ?Sized> UartRegisters for &T {
    fn read_reg(&self, reg: Reg) -> u32 {
        (**self).read_reg(reg)
    }

    fn write_reg(&self, reg: Reg, val: u32) {
        (**self).write_reg(reg, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_interrupt_identification() {
        assert_eq!(InterruptSource::decode(0xC1), InterruptSource::None);
        assert_eq!(InterruptSource::decode(0xC6), InterruptSource::LineStatus);
        assert_eq!(InterruptSource::decode(0xC4), InterruptSource::RxData);
        assert_eq!(InterruptSource::decode(0xCC), InterruptSource::RxTimeout);
        assert_eq!(InterruptSource::decode(0x02), InterruptSource::TxEmpty);
        assert_eq!(InterruptSource::decode(0xC0), InterruptSource::Other(0));
    }

    #[test]
    fn aliased_offsets() {
        assert_eq!(Reg::Rbr.offset(), Reg::Dll.offset());
        assert_eq!(Reg::Thr.offset(), Reg::Rbr.offset());
        assert_eq!(Reg::Ier.offset(), Reg::Dlm.offset());
        assert_eq!(Reg::Iir.offset(), Reg::Fcr.offset());
        assert_ne!(Reg::Lcr.offset(), Reg::Lsr.offset());
    }
}
