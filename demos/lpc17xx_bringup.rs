//! LPC17xx 串口启动示例
//!
//! 用编译期启用的端口建立注册表并放入 `static`，每个 UART 向量转发到
//! `SerialDriver::serve_interrupt`，然后通过 UART0 回显收到的字节。
//!
//! 只能在 LPC17xx 目标板上运行：主机上访问寄存器地址会直接崩溃。

use core::fmt::Write as _;

use log::{info, warn};
use lpc17xx_serial::{
    lpc17xx::{init_serial, Lpc17xxSerial, ENABLED_PORTS, UART0},
    ChannelFlags, Config, DataBits, Irq, Parity, SerialError, StopBits,
};

/// 核心时钟 100 MHz
const CCLK_HZ: u32 = 100_000_000;

static SERIAL: spin::Once<Lpc17xxSerial> = spin::Once::new();

fn serve(irq: Irq) {
    if let Some(serial) = SERIAL.get() {
        serial.serve_interrupt(irq);
    }
}

#[cfg(feature = "uart0")]
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn UART0_IRQHandler() {
    serve(lpc17xx_serial::lpc17xx::UART0_PORT.irq);
}

#[cfg(feature = "uart1")]
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn UART1_IRQHandler() {
    serve(lpc17xx_serial::lpc17xx::UART1_PORT.irq);
}

#[cfg(feature = "uart2")]
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn UART2_IRQHandler() {
    serve(lpc17xx_serial::lpc17xx::UART2_PORT.irq);
}

#[cfg(feature = "uart3")]
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn UART3_IRQHandler() {
    serve(lpc17xx_serial::lpc17xx::UART3_PORT.irq);
}

fn main() -> Result<(), SerialError> {
    // SAFETY: 运行在 LPC17xx 上，且只初始化一次
    let serial = unsafe { init_serial(CCLK_HZ) }?;
    let serial = SERIAL.call_once(|| serial);

    let config = Config::new()
        .baudrate(115200)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None);

    for port in ENABLED_PORTS {
        serial.start(port.id, Some(&config))?;
        info!("port {:?} up on irq {}", port.id, port.irq.0);
    }

    let console = serial.channel(UART0).ok_or(SerialError::UnknownPort(UART0))?;
    if writeln!(console.writer(), "lpc17xx-serial echo").is_err() {
        warn!("console write failed");
    }

    loop {
        if let Some(byte) = console.try_get() {
            console.write_blocking(&[byte])?;
        }

        let errors = console.get_and_clear_flags() & ChannelFlags::ERRORS;
        if !errors.is_empty() {
            warn!("line errors: {:?}", errors);
        }
    }
}
