//! 端口描述与外部协作者接口

/// 逻辑串口编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub u8);

/// 中断向量编号（NVIC 中的 IRQn）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Irq(pub u16);

/// 外设时钟分频
///
/// PCLKSEL 中每个外设占 2 位：00 = CCLK/4，01 = CCLK，10 = CCLK/2，11 = CCLK/8。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDivider {
    Div1,
    Div2,
    Div4,
    Div8,
}

impl ClockDivider {
    /// 合法分频比为 1/2/4/8，其余按 1 处理
    pub fn from_ratio(ratio: u32) -> Self {
        match ratio {
            2 => ClockDivider::Div2,
            4 => ClockDivider::Div4,
            8 => ClockDivider::Div8,
            _ => ClockDivider::Div1,
        }
    }

    pub fn ratio(self) -> u32 {
        match self {
            ClockDivider::Div1 => 1,
            ClockDivider::Div2 => 2,
            ClockDivider::Div4 => 4,
            ClockDivider::Div8 => 8,
        }
    }

    /// PCLKSEL 字段值
    pub fn select_bits(self) -> u32 {
        match self {
            ClockDivider::Div4 => 0b00,
            ClockDivider::Div1 => 0b01,
            ClockDivider::Div2 => 0b10,
            ClockDivider::Div8 => 0b11,
        }
    }
}

/// 逻辑串口到硬件寄存器块和中断向量的静态绑定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor {
    pub id: PortId,
    /// 寄存器块基地址
    pub base: usize,
    pub irq: Irq,
    /// 默认中断优先级（0 最高）
    pub priority: u8,
    /// 外设时钟分频比
    pub clock_ratio: u32,
}

impl PortDescriptor {
    pub fn clock_divider(&self) -> ClockDivider {
        ClockDivider::from_ratio(self.clock_ratio)
    }
}

/// 时钟树
pub trait ClockControl {
    /// 分频前的核心时钟频率
    fn core_clock_hz(&self) -> u32;
    /// 选择端口外设时钟的分频
    fn select_divider(&self, port: PortId, divider: ClockDivider);

    fn peripheral_clock_hz(&self, divider: ClockDivider) -> u32 {
        self.core_clock_hz() / divider.ratio()
    }
}

/// 中断控制器
pub trait InterruptController {
    fn enable_vector(&self, irq: Irq, priority: u8);
    fn disable_vector(&self, irq: Irq);
}

/// 引脚复用
pub trait PinMux {
    /// 把端口的 TXD/RXD 引脚切换到 UART 功能
    fn select_uart_pins(&self, port: PortId);
}

/// 驱动需要的全部平台协作者
pub trait Platform: ClockControl + InterruptController + PinMux {}

impl<T: ClockControl + InterruptController + PinMux> Platform for T {}
