//! LPC17xx 平台绑定
//!
//! - 四个 UART 的静态端口表，启用哪些端口由 `uart0`..`uart3` feature 决定
//! - [`Mmio`]：UART 寄存器块
//! - [`Lpc17xx`]：PCLKSEL 时钟选择、PINSEL 引脚复用和 NVIC
//! - [`init_serial`]：用 [`ENABLED_PORTS`] 建立注册表

use core::ptr::NonNull;

use log::warn;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_structs,
    registers::*,
};

use crate::{port::*, SerialDriver, SerialError};

pub mod mmio;

pub use mmio::*;

// ============================================================================
// 端口表
// ============================================================================

pub const UART0: PortId = PortId(0);
pub const UART1: PortId = PortId(1);
pub const UART2: PortId = PortId(2);
pub const UART3: PortId = PortId(3);

/// 默认中断优先级
pub const SERIAL_IRQ_PRIORITY: u8 = 3;

/// 默认外设时钟分频比
pub const SERIAL_CLOCK_RATIO: u32 = 1;

pub const UART0_PORT: PortDescriptor = PortDescriptor {
    id: UART0,
    base: 0x4000_C000,
    irq: Irq(5),
    priority: SERIAL_IRQ_PRIORITY,
    clock_ratio: SERIAL_CLOCK_RATIO,
};

pub const UART1_PORT: PortDescriptor = PortDescriptor {
    id: UART1,
    base: 0x4001_0000,
    irq: Irq(6),
    priority: SERIAL_IRQ_PRIORITY,
    clock_ratio: SERIAL_CLOCK_RATIO,
};

pub const UART2_PORT: PortDescriptor = PortDescriptor {
    id: UART2,
    base: 0x4009_8000,
    irq: Irq(7),
    priority: SERIAL_IRQ_PRIORITY,
    clock_ratio: SERIAL_CLOCK_RATIO,
};

pub const UART3_PORT: PortDescriptor = PortDescriptor {
    id: UART3,
    base: 0x4009_C000,
    irq: Irq(8),
    priority: SERIAL_IRQ_PRIORITY,
    clock_ratio: SERIAL_CLOCK_RATIO,
};

/// 编译期启用的端口
pub const ENABLED_PORTS: &[PortDescriptor] = &[
    #[cfg(feature = "uart0")]
    UART0_PORT,
    #[cfg(feature = "uart1")]
    UART1_PORT,
    #[cfg(feature = "uart2")]
    UART2_PORT,
    #[cfg(feature = "uart3")]
    UART3_PORT,
];

/// 片上串口注册表
pub type Lpc17xxSerial = SerialDriver<Mmio, Lpc17xx>;

/// 为所有编译期启用的端口建立注册表
///
/// 只绑定寄存器块和引脚；各端口仍需 `start` 后才会打开时钟和中断向量。
///
/// # Safety
///
/// 只能在 LPC17xx 上调用一次，返回值通常放入 `static`，由各 UART 向量调用
/// [`SerialDriver::serve_interrupt`]。
pub unsafe fn init_serial(cclk_hz: u32) -> Result<Lpc17xxSerial, SerialError> {
    SerialDriver::try_init(Lpc17xx::new(cclk_hz), ENABLED_PORTS, |desc| {
        Mmio::from_descriptor(desc).ok_or(SerialError::InvalidBase(desc.id))
    })
}

// ============================================================================
// 系统寄存器
// ============================================================================

register_structs! {
    /// 系统控制块中的外设时钟选择寄存器
    ScRegisters {
        (0x000 => _reserved0),
        (0x1a8 => pclksel0: ReadWrite<u32>),
        (0x1ac => pclksel1: ReadWrite<u32>),
        (0x1b0 => @END),
    }
}

register_structs! {
    /// 引脚功能选择 PINSEL0..PINSEL10
    PinconRegisters {
        (0x000 => pinsel: [ReadWrite<u32>; 11]),
        (0x02c => @END),
    }
}

register_structs! {
    /// NVIC，从 0xE000_E100 开始
    NvicRegisters {
        (0x000 => iser: [ReadWrite<u32>; 8]),
        (0x020 => _reserved0),
        (0x080 => icer: [ReadWrite<u32>; 8]),
        (0x0a0 => _reserved1),
        (0x180 => icpr: [ReadWrite<u32>; 8]),
        (0x1a0 => _reserved2),
        (0x300 => ipr: [ReadWrite<u8>; 112]),
        (0x370 => @END),
    }
}

pub const SC_BASE: usize = 0x400F_C000;
pub const PINCON_BASE: usize = 0x4002_C000;
pub const NVIC_BASE: usize = 0xE000_E100;

/// LPC17xx 实现的优先级位数
pub const CORTEX_PRIORITY_BITS: u8 = 5;

/// 优先级编号转换为 IPR 字节值
pub const fn cortex_priority_mask(prio: u8) -> u8 {
    prio << (8 - CORTEX_PRIORITY_BITS)
}

/// LPC17xx 平台协作者
pub struct Lpc17xx {
    sc: NonNull<ScRegisters>,
    pincon: NonNull<PinconRegisters>,
    nvic: NonNull<NvicRegisters>,
    cclk_hz: u32,
}

// SAFETY: 所有修改都是单条读改写，驱动只在临界区内调用时钟和中断相关方法
unsafe impl Send for Lpc17xx {}
unsafe impl Sync for Lpc17xx {}

impl Lpc17xx {
    /// 使用芯片固定地址
    ///
    /// # Safety
    ///
    /// 只能在 LPC17xx 上调用，且 SC/PINCON/NVIC 不应被其他代码以冲突方式修改。
    pub unsafe fn new(cclk_hz: u32) -> Self {
        Self::from_raw(
            NonNull::new_unchecked(SC_BASE as *mut u8),
            NonNull::new_unchecked(PINCON_BASE as *mut u8),
            NonNull::new_unchecked(NVIC_BASE as *mut u8),
            cclk_hz,
        )
    }

    /// 使用给定的 SC / PINCON / NVIC 基地址
    ///
    /// # Safety
    ///
    /// 三个指针必须分别指向有效、对齐且足够大的寄存器块，生命周期覆盖返回值。
    pub unsafe fn from_raw(
        sc: NonNull<u8>,
        pincon: NonNull<u8>,
        nvic: NonNull<u8>,
        cclk_hz: u32,
    ) -> Self {
        Self {
            sc: sc.cast(),
            pincon: pincon.cast(),
            nvic: nvic.cast(),
            cclk_hz,
        }
    }

    fn sc(&self) -> &ScRegisters {
        unsafe { self.sc.as_ref() }
    }

    fn pincon(&self) -> &PinconRegisters {
        unsafe { self.pincon.as_ref() }
    }

    fn nvic(&self) -> &NvicRegisters {
        unsafe { self.nvic.as_ref() }
    }
}

impl ClockControl for Lpc17xx {
    fn core_clock_hz(&self) -> u32 {
        self.cclk_hz
    }

    fn select_divider(&self, port: PortId, divider: ClockDivider) {
        let (reg, shift) = match port {
            UART0 => (&self.sc().pclksel0, 6),
            UART1 => (&self.sc().pclksel0, 8),
            UART2 => (&self.sc().pclksel1, 16),
            UART3 => (&self.sc().pclksel1, 18),
            _ => {
                warn!("no PCLKSEL field for port {:?}", port);
                return;
            }
        };

        reg.set((reg.get() & !(0b11 << shift)) | (divider.select_bits() << shift));
    }
}

impl InterruptController for Lpc17xx {
    fn enable_vector(&self, irq: Irq, priority: u8) {
        let n = usize::from(irq.0);
        let nvic = self.nvic();
        let Some(ipr) = nvic.ipr.get(n) else {
            warn!("irq {} out of range", n);
            return;
        };

        ipr.set(cortex_priority_mask(priority));
        nvic.icpr[n / 32].set(1 << (n % 32));
        nvic.iser[n / 32].set(1 << (n % 32));
    }

    fn disable_vector(&self, irq: Irq) {
        let n = usize::from(irq.0);
        let nvic = self.nvic();
        let Some(ipr) = nvic.ipr.get(n) else {
            warn!("irq {} out of range", n);
            return;
        };

        nvic.icer[n / 32].set(1 << (n % 32));
        ipr.set(0);
        // 确保返回前向量已关闭
        mbarrier::mb();
    }
}

impl PinMux for Lpc17xx {
    fn select_uart_pins(&self, port: PortId) {
        // (PINSEL 编号, 置位的位)
        let sel: &[(usize, u32)] = match port {
            // P0.2 TXD0, P0.3 RXD0
            UART0 => &[(0, (1 << 4) | (1 << 6))],
            // P0.15 TXD1, P0.16 RXD1
            UART1 => &[(0, 1 << 30), (1, 1 << 0)],
            // P2.8 TXD2, P2.9 RXD2
            UART2 => &[(4, (1 << 17) | (1 << 19))],
            // P0.0 TXD3, P0.1 RXD3
            UART3 => &[(0, (1 << 1) | (1 << 3))],
            _ => {
                warn!("no pin mapping for port {:?}", port);
                return;
            }
        };

        for &(idx, bits) in sel {
            let reg = &self.pincon().pinsel[idx];
            reg.set(reg.get() | bits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_mask_uses_upper_five_bits() {
        assert_eq!(cortex_priority_mask(0), 0x00);
        assert_eq!(cortex_priority_mask(3), 0x18);
        assert_eq!(cortex_priority_mask(31), 0xF8);
    }

    #[test]
    fn port_table_vectors_are_distinct() {
        let ports = [UART0_PORT, UART1_PORT, UART2_PORT, UART3_PORT];
        for (i, a) in ports.iter().enumerate() {
            for b in &ports[i + 1..] {
                assert_ne!(a.irq, b.irq);
                assert_ne!(a.base, b.base);
            }
        }
    }

    #[cfg(feature = "uart0")]
    #[test]
    fn uart0_enabled_by_default() {
        assert!(ENABLED_PORTS.iter().any(|p| p.id == UART0));
    }

    /// 主机内存中的 SC / PINCON / NVIC 寄存器块
    struct HostBlocks {
        sc: [u32; 0x1b0 / 4],
        pincon: [u32; 11],
        nvic: [u32; 0x370 / 4],
    }

    impl HostBlocks {
        fn new() -> Self {
            Self {
                sc: [0; 0x1b0 / 4],
                pincon: [0; 11],
                nvic: [0; 0x370 / 4],
            }
        }

        fn platform(&mut self) -> Lpc17xx {
            unsafe {
                Lpc17xx::from_raw(
                    NonNull::from(&mut self.sc).cast(),
                    NonNull::from(&mut self.pincon).cast(),
                    NonNull::from(&mut self.nvic).cast(),
                    100_000_000,
                )
            }
        }
    }

    #[test]
    fn divider_touches_only_its_field() {
        let mut blocks = HostBlocks::new();
        let lpc = blocks.platform();
        lpc.sc().pclksel0.set(u32::MAX);

        lpc.select_divider(UART0, ClockDivider::Div4);
        assert_eq!(lpc.sc().pclksel0.get(), !(0b11 << 6));

        lpc.select_divider(UART1, ClockDivider::Div2);
        assert_eq!(lpc.sc().pclksel0.get(), !((0b11 << 6) | (0b01 << 8)));

        lpc.select_divider(UART3, ClockDivider::Div8);
        lpc.select_divider(UART2, ClockDivider::Div1);
        assert_eq!(lpc.sc().pclksel1.get(), (0b11 << 18) | (0b01 << 16));

        assert_eq!(lpc.peripheral_clock_hz(ClockDivider::Div4), 25_000_000);
    }

    #[test]
    fn pin_select_sets_listed_bits() {
        let mut blocks = HostBlocks::new();
        let lpc = blocks.platform();
        lpc.pincon().pinsel[0].set(1 << 20);

        lpc.select_uart_pins(UART0);
        lpc.select_uart_pins(UART1);
        assert_eq!(
            lpc.pincon().pinsel[0].get(),
            (1 << 20) | (1 << 4) | (1 << 6) | (1 << 30)
        );
        assert_eq!(lpc.pincon().pinsel[1].get(), 1);

        lpc.select_uart_pins(UART2);
        assert_eq!(lpc.pincon().pinsel[4].get(), (1 << 17) | (1 << 19));

        lpc.select_uart_pins(UART3);
        assert_eq!(
            lpc.pincon().pinsel[0].get() & 0b1111,
            (1 << 1) | (1 << 3)
        );
    }

    #[test]
    fn vector_enable_and_disable() {
        let mut blocks = HostBlocks::new();
        let lpc = blocks.platform();

        lpc.enable_vector(UART3_PORT.irq, 3);
        let nvic = lpc.nvic();
        assert_eq!(nvic.ipr[8].get(), 0x18);
        assert_eq!(nvic.icpr[0].get(), 1 << 8);
        assert_eq!(nvic.iser[0].get(), 1 << 8);
        assert_eq!(nvic.icer[0].get(), 0);

        lpc.disable_vector(UART3_PORT.irq);
        assert_eq!(nvic.icer[0].get(), 1 << 8);
        assert_eq!(nvic.ipr[8].get(), 0);

        // 第二个字
        lpc.enable_vector(Irq(33), 1);
        assert_eq!(nvic.iser[1].get(), 1 << 1);
        assert_eq!(nvic.ipr[33].get(), 0x08);
    }

    #[test]
    fn vector_out_of_range_is_ignored() {
        let mut blocks = HostBlocks::new();
        let lpc = blocks.platform();

        lpc.enable_vector(Irq(200), 3);
        lpc.disable_vector(Irq(200));
        let nvic = lpc.nvic();
        assert!(nvic.iser.iter().all(|r| r.get() == 0));
        assert!(nvic.icer.iter().all(|r| r.get() == 0));
    }
}
