//! LPC17xx UART 内存映射访问

use core::ptr::NonNull;

use tock_registers::{
    interfaces::{Readable, Writeable},
    register_structs,
    registers::*,
};

use crate::{port::PortDescriptor, Reg, UartRegisters};

register_structs! {
    /// UART0/2/3 寄存器块（UART1 在 0x10/0x18 额外有 MCR/MSR），参考 UM10360 第 14 章
    UartRegisterBlock {
        (0x000 => rbr_thr_dll: ReadWrite<u32>),  // RBR(读) / THR(写) / DLL(DLAB=1)
        (0x004 => dlm_ier: ReadWrite<u32>),      // IER / DLM(DLAB=1)
        (0x008 => iir_fcr: ReadWrite<u32>),      // IIR(读) / FCR(写)
        (0x00c => lcr: ReadWrite<u32>),          // 线路控制
        (0x010 => _reserved0),
        (0x014 => lsr: ReadOnly<u32>),           // 线路状态
        (0x018 => _reserved1),
        (0x01c => scr: ReadWrite<u32>),          // 临时寄存器
        (0x020 => acr: ReadWrite<u32>),          // 自动波特率控制
        (0x024 => _reserved2),                   // ICR，不使用
        (0x028 => fdr: ReadWrite<u32>),          // 小数分频
        (0x02c => _reserved3),
        (0x030 => ter: ReadWrite<u32>),          // 发送使能
        (0x034 => @END),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Mmio {
    base: NonNull<UartRegisterBlock>,
}

// SAFETY: UART 寄存器访问是单次 32 位读写，驱动保证同一时刻只有一个上下文在编程寄存器
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

impl Mmio {
    /// # Safety
    ///
    /// `base` 必须指向已映射的 UART 寄存器块，且不能被其他驱动同时使用。
    pub unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }

    /// # Safety
    ///
    /// 同 [`Mmio::new`]，基地址取自端口描述。
    pub unsafe fn from_descriptor(desc: &PortDescriptor) -> Option<Self> {
        NonNull::new(desc.base as *mut u8).map(|base| Self::new(base))
    }

    fn registers(&self) -> &UartRegisterBlock {
        unsafe { self.base.as_ref() }
    }
}

impl UartRegisters for Mmio {
    fn read_reg(&self, reg: Reg) -> u32 {
        let r = self.registers();
        match reg {
            Reg::Rbr | Reg::Thr | Reg::Dll => r.rbr_thr_dll.get(),
            Reg::Ier | Reg::Dlm => r.dlm_ier.get(),
            Reg::Iir | Reg::Fcr => r.iir_fcr.get(),
            Reg::Lcr => r.lcr.get(),
            Reg::Lsr => r.lsr.get(),
            Reg::Scr => r.scr.get(),
            Reg::Acr => r.acr.get(),
            Reg::Fdr => r.fdr.get(),
            Reg::Ter => r.ter.get(),
        }
    }

    fn write_reg(&self, reg: Reg, val: u32) {
        let r = self.registers();
        match reg {
            Reg::Rbr | Reg::Thr | Reg::Dll => r.rbr_thr_dll.set(val),
            Reg::Ier | Reg::Dlm => r.dlm_ier.set(val),
            Reg::Iir | Reg::Fcr => r.iir_fcr.set(val),
            Reg::Lcr => r.lcr.set(val),
            // 只读
            Reg::Lsr => {}
            Reg::Scr => r.scr.set(val),
            Reg::Acr => r.acr.set(val),
            Reg::Fdr => r.fdr.set(val),
            Reg::Ter => r.ter.set(val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lpc17xx::{UART0, UART0_PORT},
        sim::SimPlatform,
        SerialDriver, SerialError,
    };

    fn bind(desc: &PortDescriptor) -> Result<Mmio, SerialError> {
        unsafe { Mmio::from_descriptor(desc) }.ok_or(SerialError::InvalidBase(desc.id))
    }

    #[test]
    fn start_programs_register_block() {
        let mut block = [0u32; 0x34 / 4];
        let desc = PortDescriptor {
            base: block.as_mut_ptr() as usize,
            ..UART0_PORT
        };

        let serial: SerialDriver<Mmio, SimPlatform> =
            SerialDriver::try_init(SimPlatform::new(100_000_000), &[desc], bind).unwrap();
        serial.start(UART0, None).unwrap();

        // 主机内存没有 DLAB 别名，同一偏移保留最后一次写入
        let regs = serial.channel(UART0).unwrap().registers();
        assert_eq!(regs.read_reg(Reg::Dll), 162);
        assert_eq!(regs.read_reg(Reg::Ier), 0x05);
        assert_eq!(regs.read_reg(Reg::Fcr), 0x07);
        assert_eq!(regs.read_reg(Reg::Lcr), 0x03);
        assert_eq!(regs.read_reg(Reg::Acr), 0);
        assert_eq!(regs.read_reg(Reg::Fdr), 0x10);
        assert_eq!(regs.read_reg(Reg::Ter), 0x80);
    }

    #[test]
    fn lsr_is_read_only() {
        let mut block = [0u32; 0x34 / 4];
        block[0x14 / 4] = 0x60;
        let mmio = unsafe { Mmio::new(NonNull::from(&mut block).cast()) };

        mmio.write_reg(Reg::Lsr, 0);
        mmio.write_reg(Reg::Scr, 0x5A);
        assert_eq!(mmio.read_reg(Reg::Lsr), 0x60);
        assert_eq!(mmio.read_reg(Reg::Scr), 0x5A);
        assert!(mmio.line_status().can_write());
    }

    #[test]
    fn null_base_is_rejected() {
        let desc = PortDescriptor { base: 0, ..UART0_PORT };
        let serial: Result<SerialDriver<Mmio, SimPlatform>, _> =
            SerialDriver::try_init(SimPlatform::new(100_000_000), &[desc], bind);
        assert!(matches!(serial, Err(SerialError::InvalidBase(UART0))));
    }
}
