use core::{cell::Cell, fmt};

use critical_section::{CriticalSection, Mutex};
use log::{debug, warn};

use crate::{
    config::Config,
    flags::{ChannelFlags, EventFlags},
    port::{InterruptController, Platform, PortDescriptor},
    queue::{ByteQueue, QueueHook},
    regs::*,
    SerialError, FIFO_DEPTH, SERIAL_BUFFERS_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Stopped,
    Ready,
}

/// 一个逻辑串口：寄存器块 + 输入/输出队列 + 状态 + 标志
///
/// 所有方法只需要 `&self`，因此可以同时被应用线程和中断入口使用。
/// 中断与线程之间共享的数据都在临界区内访问。
pub struct Channel<R, const IQ: usize = SERIAL_BUFFERS_SIZE, const OQ: usize = SERIAL_BUFFERS_SIZE>
{
    desc: PortDescriptor,
    hw: R,
    state: Mutex<Cell<ChannelState>>,
    config: Mutex<Cell<Config>>,
    iqueue: ByteQueue<IQ>,
    oqueue: ByteQueue<OQ>,
    flags: EventFlags,
}

impl<R: UartRegisters, const IQ: usize, const OQ: usize> Channel<R, IQ, OQ> {
    /// 创建处于 `Stopped` 状态的通道，不访问硬件
    pub fn new(desc: PortDescriptor, hw: R) -> Self {
        Self {
            desc,
            hw,
            state: Mutex::new(Cell::new(ChannelState::Stopped)),
            config: Mutex::new(Cell::new(Config::new())),
            iqueue: ByteQueue::new(),
            oqueue: ByteQueue::new(),
            flags: EventFlags::new(),
        }
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.desc
    }

    pub fn registers(&self) -> &R {
        &self.hw
    }

    pub fn state(&self) -> ChannelState {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ChannelState::Ready
    }

    /// 最近一次 `start` 使用的配置
    pub fn config(&self) -> Config {
        critical_section::with(|cs| self.config.borrow(cs).get())
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 配置并启动通道，`config` 为 `None` 时使用默认配置
    ///
    /// 时钟分频和中断向量只在 `Stopped → Ready` 时设置；UART 寄存器每次都会重新编程，
    /// 因此对运行中的通道调用等同于重新配置。整个过程在临界区内完成，
    /// 中断服务程序不会看到编程到一半的寄存器。
    pub fn start<P: Platform + ?Sized>(
        &self,
        platform: &P,
        config: Option<&Config>,
    ) -> Result<(), SerialError> {
        let config = config.copied().unwrap_or_default();
        let divider = self.desc.clock_divider();
        let pclk = platform.peripheral_clock_hz(divider);
        let divisor = config.divisor(pclk).map_err(|e| {
            warn!(
                "port {:?}: baud rate {} rejected (pclk {} Hz)",
                self.desc.id,
                config.baud_rate(),
                pclk
            );
            e
        })?;

        let was = critical_section::with(|cs| {
            let state = self.state.borrow(cs);
            let was = state.get();
            if was == ChannelState::Stopped {
                platform.select_divider(self.desc.id, divider);
                platform.enable_vector(self.desc.irq, self.desc.priority);
            }

            self.program(&config, divisor);
            self.config.borrow(cs).set(config);
            state.set(ChannelState::Ready);

            // 重新编程会复位 TX FIFO 并关闭 THRE 中断，队列里剩余的数据要重新启动发送
            if !self.oqueue.is_empty_i(cs) {
                self.preload(cs);
            }
            was
        });

        match was {
            ChannelState::Stopped => debug!(
                "port {:?} started: baud {}, divisor {}, lcr {:#04x}, fcr {:#04x}",
                self.desc.id,
                config.baud_rate(),
                divisor,
                config.line_control(),
                config.fifo_control()
            ),
            ChannelState::Ready => debug!(
                "port {:?} reprogrammed: baud {}, divisor {}",
                self.desc.id,
                config.baud_rate(),
                divisor
            ),
        }
        Ok(())
    }

    /// 停止通道：关闭 UART 和中断向量，丢弃两个队列中的数据
    ///
    /// 对 `Stopped` 通道无效果。时钟分频选择保持不变。
    pub fn stop<P: InterruptController + ?Sized>(&self, platform: &P) {
        let stopped = critical_section::with(|cs| {
            let state = self.state.borrow(cs);
            if state.get() != ChannelState::Ready {
                return false;
            }

            self.deprogram();
            platform.disable_vector(self.desc.irq);
            state.set(ChannelState::Stopped);
            self.oqueue.reset_i(cs);
            self.iqueue.reset_i(cs);
            true
        });

        if stopped {
            debug!("port {:?} stopped", self.desc.id);
        }
    }

    fn program(&self, config: &Config, divisor: u16) {
        let lcr = u32::from(config.line_control());
        let fcr = u32::from(FCR_ENABLE | FCR_RXRESET | FCR_TXRESET | config.fifo_control());

        self.hw.write_reg(Reg::Lcr, lcr | u32::from(LCR_DLAB));
        self.hw.write_reg(Reg::Dll, u32::from(divisor & 0xFF));
        self.hw.write_reg(Reg::Dlm, u32::from(divisor >> 8));
        self.hw.write_reg(Reg::Lcr, lcr);
        self.hw.write_reg(Reg::Fcr, fcr);
        self.hw.write_reg(Reg::Acr, 0);
        self.hw.write_reg(Reg::Fdr, FDR_PASSTHROUGH);
        self.hw.write_reg(Reg::Ter, TER_ENABLE);
        self.hw
            .set_interrupt_enable(InterruptEnable::RX_AVAILABLE | InterruptEnable::RX_LINE_STATUS);
    }

    fn deprogram(&self) {
        self.hw.write_reg(Reg::Lcr, u32::from(LCR_DLAB));
        self.hw.write_reg(Reg::Dll, 1);
        self.hw.write_reg(Reg::Dlm, 0);
        self.hw.write_reg(Reg::Lcr, 0);
        self.hw.write_reg(Reg::Fdr, FDR_PASSTHROUGH);
        self.hw.set_interrupt_enable(InterruptEnable::empty());
        self.hw
            .write_reg(Reg::Fcr, u32::from(FCR_RXRESET | FCR_TXRESET));
        self.hw.write_reg(Reg::Acr, 0);
        self.hw.write_reg(Reg::Ter, TER_ENABLE);
    }

    // ========================================================================
    // 中断处理
    // ========================================================================

    /// 中断入口
    ///
    /// 一直处理到 IIR 报告没有挂起的中断才返回，避免刚退出又再次进入。
    pub fn serve_interrupt(&self) {
        if !self.is_ready() {
            return;
        }

        loop {
            match self.hw.interrupt_source() {
                InterruptSource::None => return,
                InterruptSource::LineStatus => self.set_error(self.hw.line_status()),
                InterruptSource::RxTimeout | InterruptSource::RxData => self.drain_rx(),
                InterruptSource::TxEmpty => self.refill_tx(),
                InterruptSource::Other(_) => {
                    // 读数据寄存器清除锁存状态，不动队列
                    let _ = self.hw.read_reg(Reg::Thr);
                    let _ = self.hw.read_reg(Reg::Rbr);
                }
            }
        }
    }

    fn set_error(&self, lsr: LineStatus) {
        let sts = ChannelFlags::from_line_status(lsr);
        if !sts.is_empty() {
            self.flags.add(sts);
        }
    }

    fn drain_rx(&self) {
        critical_section::with(|cs| {
            if self.iqueue.is_empty_i(cs) {
                self.flags.add_i(cs, ChannelFlags::INPUT_AVAILABLE);
            }
        });

        loop {
            let lsr = self.hw.line_status();
            // 读 LSR 会清除错误位，这里顺带上报
            self.set_error(lsr);
            if !lsr.can_read() {
                break;
            }

            let byte = self.hw.read_reg(Reg::Rbr) as u8;
            critical_section::with(|cs| {
                if self.iqueue.push_i(cs, byte).is_err() {
                    self.flags.add_i(cs, ChannelFlags::OVERRUN_ERROR);
                }
            });
        }
    }

    fn refill_tx(&self) {
        let drained = self.fill_fifo(|| critical_section::with(|cs| self.oqueue.pop_i(cs)));
        if drained {
            self.hw.disable_interrupts(InterruptEnable::TX_EMPTY);
            self.flags.add(ChannelFlags::OUTPUT_EMPTY);
        }
    }

    /// 从输出队列向 THR 最多写入 `FIFO_DEPTH` 个字节
    ///
    /// 返回 `true` 表示中途队列已空。
    fn fill_fifo(&self, mut pop: impl FnMut() -> Option<u8>) -> bool {
        for _ in 0..FIFO_DEPTH {
            match pop() {
                Some(b) => self.hw.write_reg(Reg::Thr, u32::from(b)),
                None => return true,
            }
        }
        false
    }

    /// 输出队列由空变为非空时，在推入者的临界区内直接填充硬件 FIFO
    fn preload(&self, cs: CriticalSection<'_>) {
        let lsr = self.hw.line_status();
        self.flags.add_i(cs, ChannelFlags::from_line_status(lsr));

        if lsr.can_write() && self.fill_fifo(|| self.oqueue.pop_i(cs)) {
            self.flags.add_i(cs, ChannelFlags::OUTPUT_EMPTY);
            return;
        }
        self.hw.enable_interrupts(InterruptEnable::TX_EMPTY);
    }

    // ========================================================================
    // 应用接口
    // ========================================================================

    /// 非阻塞写入，返回实际进入输出队列的字节数
    pub fn write(&self, bytes: &[u8]) -> Result<usize, SerialError> {
        critical_section::with(|cs| {
            if self.state.borrow(cs).get() != ChannelState::Ready {
                return Err(SerialError::NotReady);
            }
            Ok(self.oqueue.write_i(cs, bytes, self))
        })
    }

    pub fn try_put(&self, byte: u8) -> Result<(), SerialError> {
        match self.write(&[byte])? {
            0 => Err(SerialError::QueueFull),
            _ => Ok(()),
        }
    }

    /// 忙等直到 `bytes` 全部进入输出队列
    pub fn write_blocking(&self, mut bytes: &[u8]) -> Result<(), SerialError> {
        while !bytes.is_empty() {
            let n = self.write(bytes)?;
            bytes = &bytes[n..];
            if n == 0 {
                core::hint::spin_loop();
            }
        }
        Ok(())
    }

    pub fn try_get(&self) -> Option<u8> {
        self.iqueue.pop()
    }

    /// 非阻塞读取，返回读到的字节数
    pub fn read(&self, buf: &mut [u8]) -> usize {
        critical_section::with(|cs| self.iqueue.read_i(cs, buf))
    }

    /// 忙等直到 `buf` 填满；通道停止时返回 `NotReady`
    pub fn read_blocking(&self, buf: &mut [u8]) -> Result<(), SerialError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]);
            filled += n;
            if n == 0 {
                if !self.is_ready() {
                    return Err(SerialError::NotReady);
                }
                core::hint::spin_loop();
            }
        }
        Ok(())
    }

    pub fn input_len(&self) -> usize {
        self.iqueue.len()
    }

    pub fn output_len(&self) -> usize {
        self.oqueue.len()
    }

    pub fn flags(&self) -> ChannelFlags {
        self.flags.peek()
    }

    pub fn get_and_clear_flags(&self) -> ChannelFlags {
        self.flags.get_and_clear()
    }

    pub fn writer(&self) -> ChannelWriter<'_, R, IQ, OQ> {
        ChannelWriter { channel: self }
    }
}

impl<R: UartRegisters, const IQ: usize, const OQ: usize> QueueHook for Channel<R, IQ, OQ> {
    fn on_wake(&self, cs: CriticalSection<'_>) {
        self.preload(cs);
    }
}

/// `core::fmt::Write` 适配，写入走阻塞路径
pub struct ChannelWriter<'a, R, const IQ: usize, const OQ: usize> {
    channel: &'a Channel<R, IQ, OQ>,
}

impl<R: UartRegisters, const IQ: usize, const OQ: usize> fmt::Write for ChannelWriter<'_, R, IQ, OQ> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.channel
            .write_blocking(s.as_bytes())
            .map_err(|_| fmt::Error)
    }
}
