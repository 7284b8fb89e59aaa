use core::cell::Cell;

use bitflags::bitflags;
use critical_section::{CriticalSection, Mutex};

use crate::regs::LineStatus;

bitflags! {
    /// 通道状态标志
    ///
    /// 标志是集合而不是日志：两次读取之间发生的同类事件合并为一位。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelFlags: u32 {
        const INPUT_AVAILABLE = 4;
        const OUTPUT_EMPTY = 8;
        const PARITY_ERROR = 32;
        const FRAMING_ERROR = 64;
        const OVERRUN_ERROR = 128;
        const BREAK_DETECTED = 512;
    }
}

impl ChannelFlags {
    pub const ERRORS: ChannelFlags = ChannelFlags::PARITY_ERROR
        .union(ChannelFlags::FRAMING_ERROR)
        .union(ChannelFlags::OVERRUN_ERROR)
        .union(ChannelFlags::BREAK_DETECTED);

    /// 将 LSR 错误位转换为通道标志，多个错误可同时出现
    pub fn from_line_status(lsr: LineStatus) -> Self {
        let mut sts = ChannelFlags::empty();

        if lsr.contains(LineStatus::OVERRUN_ERROR) {
            sts |= ChannelFlags::OVERRUN_ERROR;
        }
        if lsr.contains(LineStatus::PARITY_ERROR) {
            sts |= ChannelFlags::PARITY_ERROR;
        }
        if lsr.contains(LineStatus::FRAMING_ERROR) {
            sts |= ChannelFlags::FRAMING_ERROR;
        }
        if lsr.contains(LineStatus::BREAK_INTERRUPT) {
            sts |= ChannelFlags::BREAK_DETECTED;
        }

        sts
    }
}

/// 中断与线程共享的标志集合
///
/// 驱动内部只置位；清除由应用通过 [`EventFlags::get_and_clear`] 完成。
pub struct EventFlags {
    flags: Mutex<Cell<ChannelFlags>>,
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            flags: Mutex::new(Cell::new(ChannelFlags::empty())),
        }
    }

    /// 在已持有的临界区内合并标志
    pub fn add_i(&self, cs: CriticalSection<'_>, flags: ChannelFlags) {
        let cell = self.flags.borrow(cs);
        cell.set(cell.get() | flags);
    }

    pub fn add(&self, flags: ChannelFlags) {
        critical_section::with(|cs| self.add_i(cs, flags));
    }

    /// 读取但不清除
    pub fn peek(&self) -> ChannelFlags {
        critical_section::with(|cs| self.flags.borrow(cs).get())
    }

    /// 读取并清除
    pub fn get_and_clear(&self) -> ChannelFlags {
        critical_section::with(|cs| self.flags.borrow(cs).replace(ChannelFlags::empty()))
    }
}
