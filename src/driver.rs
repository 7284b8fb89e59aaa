use heapless::Vec;
use log::{debug, trace};

use crate::{
    channel::Channel, config::Config, port::*, regs::UartRegisters, SerialError, MAX_PORTS,
    SERIAL_BUFFERS_SIZE,
};

/// 串口注册表
///
/// 拥有平台协作者和所有已启用端口的 [`Channel`]。中断入口通过向量号找到对应通道，
/// 应用通过 [`SerialDriver::channel`] 拿到通道句柄。
pub struct SerialDriver<
    R,
    P,
    const N: usize = MAX_PORTS,
    const IQ: usize = SERIAL_BUFFERS_SIZE,
    const OQ: usize = SERIAL_BUFFERS_SIZE,
> {
    platform: P,
    channels: Vec<Channel<R, IQ, OQ>, N>,
}

impl<R, P, const N: usize, const IQ: usize, const OQ: usize> SerialDriver<R, P, N, IQ, OQ>
where
    R: UartRegisters,
    P: Platform,
{
    /// 为每个端口创建通道、绑定寄存器块并选择引脚复用
    ///
    /// 不涉及时钟和中断；这些在 [`SerialDriver::start`] 时才设置。
    pub fn init<'a>(
        platform: P,
        ports: impl IntoIterator<Item = &'a PortDescriptor>,
        mut bind: impl FnMut(&PortDescriptor) -> R,
    ) -> Result<Self, SerialError> {
        Self::try_init(platform, ports, |desc| Ok(bind(desc)))
    }

    /// 同 [`SerialDriver::init`]，寄存器块绑定可能失败
    pub fn try_init<'a>(
        platform: P,
        ports: impl IntoIterator<Item = &'a PortDescriptor>,
        mut bind: impl FnMut(&PortDescriptor) -> Result<R, SerialError>,
    ) -> Result<Self, SerialError> {
        let mut channels: Vec<Channel<R, IQ, OQ>, N> = Vec::new();

        for desc in ports {
            if channels.iter().any(|c| c.descriptor().id == desc.id) {
                return Err(SerialError::DuplicatePort(desc.id));
            }
            if channels.is_full() {
                return Err(SerialError::RegistryFull);
            }
            let hw = bind(desc)?;
            channels
                .push(Channel::new(*desc, hw))
                .map_err(|_| SerialError::RegistryFull)?;
            platform.select_uart_pins(desc.id);

            debug!(
                "port {:?} bound: base {:#x}, irq {}, priority {}",
                desc.id, desc.base, desc.irq.0, desc.priority
            );
        }

        Ok(Self { platform, channels })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn channel(&self, port: PortId) -> Option<&Channel<R, IQ, OQ>> {
        self.channels.iter().find(|c| c.descriptor().id == port)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel<R, IQ, OQ>> {
        self.channels.iter()
    }

    fn lookup(&self, port: PortId) -> Result<&Channel<R, IQ, OQ>, SerialError> {
        self.channel(port).ok_or(SerialError::UnknownPort(port))
    }

    /// 启动或重新配置端口
    pub fn start(&self, port: PortId, config: Option<&Config>) -> Result<(), SerialError> {
        self.lookup(port)?.start(&self.platform, config)
    }

    /// 停止端口；对已停止的端口无效果
    pub fn stop(&self, port: PortId) -> Result<(), SerialError> {
        self.lookup(port)?.stop(&self.platform);
        Ok(())
    }

    /// 中断向量入口
    pub fn serve_interrupt(&self, irq: Irq) {
        match self.channels.iter().find(|c| c.descriptor().irq == irq) {
            Some(channel) => channel.serve_interrupt(),
            None => trace!("spurious serial vector {}", irq.0),
        }
    }
}
