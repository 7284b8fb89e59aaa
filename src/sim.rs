//! 模拟寄存器块与平台，用于在主机上测试驱动
//!
//! [`SimUart`] 按 16550/LPC17xx 的语义模拟 UART：
//! - 偏移 0x00/0x04 按 LCR.DLAB 在 RBR/THR/IER 与 DLL/DLM 之间切换
//! - 16 字节 TX FIFO，[`SimUart::shift_out`] 把 FIFO 内容移到线路上
//! - LSR 读取清除错误位
//! - IIR 优先级：线路状态 > 接收数据 > 字符超时 > THR 空 > 其他
//! - 记录每次寄存器写入，便于比较编程序列

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::{Deque, Vec};

use crate::{port::*, regs::*, FIFO_DEPTH};

/// 可注入的接收字节上限
pub const SIM_RX_DEPTH: usize = 64;
/// 线路上保留的发送字节上限
pub const SIM_WIRE_CAPACITY: usize = 256;
/// 寄存器写入日志长度
pub const SIM_WRITE_LOG: usize = 64;

struct SimState {
    rx: Deque<u8, SIM_RX_DEPTH>,
    tx_fifo: Deque<u8, FIFO_DEPTH>,
    wire: Vec<u8, SIM_WIRE_CAPACITY>,
    errors: LineStatus,
    thre_pending: bool,
    other_pending: bool,
    ier: u32,
    lcr: u32,
    dll: u32,
    dlm: u32,
    fcr: u32,
    scr: u32,
    acr: u32,
    fdr: u32,
    ter: u32,
    writes: Vec<(Reg, u32), SIM_WRITE_LOG>,
}

impl SimState {
    const fn new() -> Self {
        Self {
            rx: Deque::new(),
            tx_fifo: Deque::new(),
            wire: Vec::new(),
            errors: LineStatus::empty(),
            thre_pending: false,
            other_pending: false,
            ier: 0,
            lcr: 0,
            dll: 1,
            dlm: 0,
            fcr: 0,
            scr: 0,
            acr: 0,
            fdr: FDR_PASSTHROUGH,
            ter: TER_ENABLE,
            writes: Vec::new(),
        }
    }

    fn dlab(&self) -> bool {
        self.lcr & u32::from(LCR_DLAB) != 0
    }

    fn rx_trigger(&self) -> usize {
        match (self.fcr as u8) & FCR_TRIGGER_MASK {
            FCR_TRIGGER0 => 1,
            FCR_TRIGGER1 => 4,
            FCR_TRIGGER2 => 8,
            _ => 14,
        }
    }

    fn lsr(&self) -> LineStatus {
        let mut lsr = self.errors;
        if !self.rx.is_empty() {
            lsr |= LineStatus::DATA_READY;
        }
        if self.tx_fifo.is_empty() {
            lsr |= LineStatus::TX_HOLDING_EMPTY | LineStatus::TX_EMPTY;
        }
        if !self.errors.is_empty() {
            lsr |= LineStatus::FIFO_ERROR;
        }
        lsr
    }

    fn iir(&mut self) -> u32 {
        let fifo = if self.fcr & u32::from(FCR_ENABLE) != 0 {
            IIR_FIFO_ENABLED
        } else {
            0
        };

        let src = if self.ier & IER_STATUS != 0 && !self.errors.is_empty() {
            IIR_SRC_ERROR
        } else if self.ier & IER_RBR != 0 && self.rx.len() >= self.rx_trigger() {
            IIR_SRC_RX
        } else if self.ier & IER_RBR != 0 && !self.rx.is_empty() {
            IIR_SRC_TIMEOUT
        } else if self.ier & IER_THRE != 0 && self.thre_pending {
            // 读 IIR 报告 THRE 时清除该中断
            self.thre_pending = false;
            IIR_SRC_TX
        } else if self.other_pending {
            IIR_SRC_MODEM
        } else {
            IIR_SRC_NONE
        };

        fifo | src
    }

    fn read(&mut self, reg: Reg) -> u32 {
        match reg {
            Reg::Rbr | Reg::Thr | Reg::Dll => {
                if self.dlab() {
                    self.dll
                } else {
                    self.other_pending = false;
                    self.rx.pop_front().map(u32::from).unwrap_or(0)
                }
            }
            Reg::Ier | Reg::Dlm => {
                if self.dlab() {
                    self.dlm
                } else {
                    self.ier
                }
            }
            Reg::Iir | Reg::Fcr => self.iir(),
            Reg::Lcr => self.lcr,
            Reg::Lsr => {
                let lsr = self.lsr();
                self.errors = LineStatus::empty();
                lsr.bits()
            }
            Reg::Scr => self.scr,
            Reg::Acr => self.acr,
            Reg::Fdr => self.fdr,
            Reg::Ter => self.ter,
        }
    }

    fn write(&mut self, reg: Reg, val: u32) {
        let _ = self.writes.push((reg, val));

        match reg {
            Reg::Rbr | Reg::Thr | Reg::Dll => {
                if self.dlab() {
                    self.dll = val & 0xFF;
                } else {
                    // FIFO 满时硬件丢弃
                    let _ = self.tx_fifo.push_back(val as u8);
                    self.thre_pending = false;
                }
            }
            Reg::Ier | Reg::Dlm => {
                if self.dlab() {
                    self.dlm = val & 0xFF;
                } else {
                    let enabling_thre = self.ier & IER_THRE == 0 && val & IER_THRE != 0;
                    self.ier = val & (IER_RBR | IER_THRE | IER_STATUS);
                    if enabling_thre && self.tx_fifo.is_empty() {
                        self.thre_pending = true;
                    }
                }
            }
            Reg::Iir | Reg::Fcr => {
                if val & u32::from(FCR_RXRESET) != 0 {
                    self.rx.clear();
                }
                if val & u32::from(FCR_TXRESET) != 0 {
                    self.tx_fifo.clear();
                }
                // 复位位自动清零
                self.fcr = val & !u32::from(FCR_RXRESET | FCR_TXRESET);
            }
            Reg::Lcr => self.lcr = val & 0xFF,
            Reg::Lsr => {}
            Reg::Scr => self.scr = val,
            Reg::Acr => self.acr = val,
            Reg::Fdr => self.fdr = val,
            Reg::Ter => self.ter = val,
        }
    }
}

/// 模拟 UART
pub struct SimUart {
    state: Mutex<RefCell<SimState>>,
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl SimUart {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SimState::new())),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        critical_section::with(|cs| f(&mut *self.state.borrow_ref_mut(cs)))
    }

    /// 线路上到达字节，返回进入接收 FIFO 的个数
    pub fn inject_rx(&self, bytes: &[u8]) -> usize {
        self.with(|s| {
            let mut n = 0;
            for &b in bytes {
                if s.rx.push_back(b).is_err() {
                    s.errors |= LineStatus::OVERRUN_ERROR;
                    break;
                }
                n += 1;
            }
            n
        })
    }

    /// 置位 LSR 错误位
    pub fn inject_error(&self, errors: LineStatus) {
        self.with(|s| s.errors |= errors & LineStatus::ERRORS);
    }

    /// 产生一个驱动不处理的中断源（IIR = 0），读数据寄存器后清除
    pub fn inject_other(&self) {
        self.with(|s| s.other_pending = true);
    }

    /// 模拟 TX FIFO 发送完毕，返回移出的字节数
    pub fn shift_out(&self) -> usize {
        self.with(|s| {
            let mut n = 0;
            while let Some(b) = s.tx_fifo.pop_front() {
                let _ = s.wire.push(b);
                n += 1;
            }
            if n > 0 {
                s.thre_pending = true;
            }
            n
        })
    }

    /// 已经发送到线路上的字节
    pub fn wire(&self) -> Vec<u8, SIM_WIRE_CAPACITY> {
        self.with(|s| s.wire.clone())
    }

    pub fn tx_fifo_len(&self) -> usize {
        self.with(|s| s.tx_fifo.len())
    }

    pub fn rx_fifo_len(&self) -> usize {
        self.with(|s| s.rx.len())
    }

    /// 无副作用地读取寄存器当前值
    pub fn peek(&self, reg: Reg) -> u32 {
        self.with(|s| match reg {
            Reg::Rbr | Reg::Thr => s.rx.front().copied().map(u32::from).unwrap_or(0),
            Reg::Dll => s.dll,
            Reg::Dlm => s.dlm,
            Reg::Ier => s.ier,
            Reg::Iir => IIR_SRC_NONE,
            Reg::Fcr => s.fcr,
            Reg::Lcr => s.lcr,
            Reg::Lsr => s.lsr().bits(),
            Reg::Scr => s.scr,
            Reg::Acr => s.acr,
            Reg::Fdr => s.fdr,
            Reg::Ter => s.ter,
        })
    }

    /// 取出并清空寄存器写入日志
    pub fn take_writes(&self) -> Vec<(Reg, u32), SIM_WRITE_LOG> {
        self.with(|s| core::mem::take(&mut s.writes))
    }
}

impl UartRegisters for SimUart {
    fn read_reg(&self, reg: Reg) -> u32 {
        self.with(|s| s.read(reg))
    }

    fn write_reg(&self, reg: Reg, val: u32) {
        self.with(|s| s.write(reg, val))
    }
}

/// 模拟平台记录的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    PinsSelected(PortId),
    DividerSelected(PortId, ClockDivider),
    VectorEnabled(Irq, u8),
    VectorDisabled(Irq),
}

/// 模拟时钟树、中断控制器和引脚复用
pub struct SimPlatform {
    cclk_hz: u32,
    events: Mutex<RefCell<Vec<PlatformEvent, 64>>>,
}

impl SimPlatform {
    pub const fn new(cclk_hz: u32) -> Self {
        Self {
            cclk_hz,
            events: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    fn record(&self, event: PlatformEvent) {
        critical_section::with(|cs| {
            let _ = self.events.borrow_ref_mut(cs).push(event);
        });
    }

    pub fn events(&self) -> Vec<PlatformEvent, 64> {
        critical_section::with(|cs| self.events.borrow_ref(cs).clone())
    }

    /// 向量当前是否处于使能状态
    pub fn vector_enabled(&self, irq: Irq) -> bool {
        self.events()
            .iter()
            .filter_map(|e| match *e {
                PlatformEvent::VectorEnabled(i, _) if i == irq => Some(true),
                PlatformEvent::VectorDisabled(i) if i == irq => Some(false),
                _ => None,
            })
            .last()
            .unwrap_or(false)
    }

    pub fn count(&self, event: PlatformEvent) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }
}

impl ClockControl for SimPlatform {
    fn core_clock_hz(&self) -> u32 {
        self.cclk_hz
    }

    fn select_divider(&self, port: PortId, divider: ClockDivider) {
        self.record(PlatformEvent::DividerSelected(port, divider));
    }
}

impl InterruptController for SimPlatform {
    fn enable_vector(&self, irq: Irq, priority: u8) {
        self.record(PlatformEvent::VectorEnabled(irq, priority));
    }

    fn disable_vector(&self, irq: Irq) {
        self.record(PlatformEvent::VectorDisabled(irq));
    }
}

impl PinMux for SimPlatform {
    fn select_uart_pins(&self, port: PortId) {
        self.record(PlatformEvent::PinsSelected(port));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlab_selects_divisor_latch() {
        let uart = SimUart::new();
        uart.write_reg(Reg::Lcr, u32::from(LCR_DLAB));
        uart.write_reg(Reg::Dll, 0x28);
        uart.write_reg(Reg::Dlm, 0x01);
        uart.write_reg(Reg::Lcr, 0x03);

        assert_eq!(uart.peek(Reg::Dll), 0x28);
        assert_eq!(uart.peek(Reg::Dlm), 0x01);
        assert_eq!(uart.peek(Reg::Ier), 0);
        assert_eq!(uart.tx_fifo_len(), 0);
    }

    #[test]
    fn lsr_read_clears_errors() {
        let uart = SimUart::new();
        uart.inject_error(LineStatus::PARITY_ERROR | LineStatus::BREAK_INTERRUPT);

        let lsr = uart.line_status();
        assert!(lsr.contains(LineStatus::PARITY_ERROR | LineStatus::BREAK_INTERRUPT));
        assert!(!uart.line_status().intersects(LineStatus::ERRORS));
    }

    #[test]
    fn iir_priority() {
        let uart = SimUart::new();
        uart.write_reg(Reg::Ier, IER_RBR | IER_STATUS | IER_THRE);
        uart.inject_rx(b"x");
        uart.inject_error(LineStatus::FRAMING_ERROR);

        assert_eq!(uart.interrupt_source(), InterruptSource::LineStatus);
        let _ = uart.line_status();
        assert_eq!(uart.interrupt_source(), InterruptSource::RxData);
        let _ = uart.read_reg(Reg::Rbr);
        // 使能 THRE 时 FIFO 为空，THRE 挂起；读 IIR 后清除
        assert_eq!(uart.interrupt_source(), InterruptSource::TxEmpty);
        assert_eq!(uart.interrupt_source(), InterruptSource::None);
    }

    #[test]
    fn timeout_below_trigger_level() {
        let uart = SimUart::new();
        uart.write_reg(Reg::Fcr, u32::from(FCR_ENABLE | FCR_TRIGGER1));
        uart.write_reg(Reg::Ier, IER_RBR);
        uart.inject_rx(b"ab");
        assert_eq!(uart.interrupt_source(), InterruptSource::RxTimeout);
        uart.inject_rx(b"cd");
        assert_eq!(uart.interrupt_source(), InterruptSource::RxData);
    }

    #[test]
    fn shift_out_moves_fifo_to_wire() {
        let uart = SimUart::new();
        uart.write_reg(Reg::Thr, u32::from(b'h'));
        uart.write_reg(Reg::Thr, u32::from(b'i'));
        assert!(!uart.line_status().can_write());

        assert_eq!(uart.shift_out(), 2);
        assert_eq!(uart.wire().as_slice(), b"hi");
        assert!(uart.line_status().can_write());
    }
}
