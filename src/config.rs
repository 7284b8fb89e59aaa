use crate::{regs::*, SerialError};

// ============================================================================
// 配置枚举类型
// ============================================================================

/// 数据位配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataBits {
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
}

/// 停止位配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopBits {
    One = 1,
    Two = 2,
}

/// 奇偶校验配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

/// 接收 FIFO 触发级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoTrigger {
    /// 1 字节
    Level0,
    /// 4 字节
    Level1,
    /// 8 字节
    Level2,
    /// 14 字节
    Level3,
}

impl FifoTrigger {
    fn bits(self) -> u8 {
        match self {
            FifoTrigger::Level0 => FCR_TRIGGER0,
            FifoTrigger::Level1 => FCR_TRIGGER1,
            FifoTrigger::Level2 => FCR_TRIGGER2,
            FifoTrigger::Level3 => FCR_TRIGGER3,
        }
    }
}

/// 默认波特率
pub const SERIAL_DEFAULT_BITRATE: u32 = 38400;

/// `start` 使用的串口配置
///
/// 在一次 `Ready` 期间保持不变，每次 `start` 时重新写入硬件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    baudrate: u32,
    lcr: u8,
    fcr: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// 默认配置：38400 波特，8N1，触发级别 0
    pub const fn new() -> Self {
        Self {
            baudrate: SERIAL_DEFAULT_BITRATE,
            lcr: LCR_WL8 | LCR_STOP1 | LCR_NOPARITY,
            fcr: FCR_TRIGGER0,
        }
    }

    /// 直接给出 LCR / FCR 位
    ///
    /// LCR 只保留字长、停止位和校验位（DLAB 由驱动管理，不接受断线位），
    /// FCR 只保留触发级别位。
    pub const fn from_raw(baudrate: u32, lcr: u8, fcr: u8) -> Self {
        Self {
            baudrate,
            lcr: lcr & LCR_FRAME_MASK,
            fcr: fcr & FCR_TRIGGER_MASK,
        }
    }

    pub fn baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = baudrate;
        self
    }

    pub fn data_bits(mut self, bits: DataBits) -> Self {
        let wlen = match bits {
            DataBits::Five => LCR_WL5,
            DataBits::Six => LCR_WL6,
            DataBits::Seven => LCR_WL7,
            DataBits::Eight => LCR_WL8,
        };
        self.lcr = (self.lcr & !LCR_WLEN_MASK) | wlen;
        self
    }

    pub fn stop_bits(mut self, bits: StopBits) -> Self {
        match bits {
            StopBits::One => self.lcr &= !LCR_STOP2,
            StopBits::Two => self.lcr |= LCR_STOP2,
        }
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        let bits = match parity {
            Parity::None => LCR_NOPARITY,
            Parity::Odd => LCR_PARITY_ODD,
            Parity::Even => LCR_PARITY_EVEN,
            Parity::Mark => LCR_PARITY_MARK,
            Parity::Space => LCR_PARITY_SPACE,
        };
        self.lcr = (self.lcr & !LCR_PARITY_MASK) | bits;
        self
    }

    pub fn fifo_trigger(mut self, trigger: FifoTrigger) -> Self {
        self.fcr = trigger.bits();
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baudrate
    }

    /// 线路控制位（字长、停止位、校验）
    pub fn line_control(&self) -> u8 {
        self.lcr
    }

    /// FIFO 控制位（触发级别）
    pub fn fifo_control(&self) -> u8 {
        self.fcr
    }

    /// 计算除数锁存值：PCLK / (16 * baud)
    pub fn divisor(&self, pclk_hz: u32) -> Result<u16, SerialError> {
        let div = self
            .baudrate
            .checked_mul(16)
            .filter(|d| *d != 0)
            .map(|d| pclk_hz / d)
            .ok_or(SerialError::InvalidBaudrate(self.baudrate))?;

        match u16::try_from(div) {
            Ok(div) if div != 0 => Ok(div),
            _ => Err(SerialError::InvalidBaudrate(self.baudrate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_38400_8n1() {
        let config = Config::new();
        assert_eq!(config.baud_rate(), 38400);
        assert_eq!(config.line_control(), 0x03);
        assert_eq!(config.fifo_control(), 0x00);
    }

    #[test]
    fn builder_sets_line_control_bits() {
        let config = Config::new()
            .data_bits(DataBits::Seven)
            .stop_bits(StopBits::Two)
            .parity(Parity::Even)
            .fifo_trigger(FifoTrigger::Level2);

        assert_eq!(config.line_control(), LCR_WL7 | LCR_STOP2 | LCR_PARITY_EVEN);
        assert_eq!(config.fifo_control(), 0x80);

        let config = config.parity(Parity::None).data_bits(DataBits::Eight);
        assert_eq!(config.line_control(), LCR_WL8 | LCR_STOP2);
    }

    #[test]
    fn raw_config_keeps_only_frame_and_trigger_bits() {
        let config = Config::from_raw(9600, 0x83, 0xC7);
        assert_eq!(config.line_control(), 0x03);
        assert_eq!(config.fifo_control(), 0xC0);

        // 断线位会让发送端持续输出 break
        let config = Config::from_raw(9600, LCR_BREAK | LCR_PARITY_EVEN | LCR_WL7, 0);
        assert_eq!(config.line_control(), LCR_PARITY_EVEN | LCR_WL7);
    }

    #[test]
    fn divisor_from_peripheral_clock() {
        // 25 MHz / (16 * 38400) = 40
        assert_eq!(Config::new().divisor(25_000_000), Ok(40));
        assert_eq!(
            Config::new().baudrate(115200).divisor(100_000_000),
            Ok(54)
        );
    }

    #[test]
    fn divisor_out_of_range() {
        assert_eq!(
            Config::new().baudrate(0).divisor(25_000_000),
            Err(SerialError::InvalidBaudrate(0))
        );
        assert_eq!(
            Config::new().baudrate(4_000_000).divisor(25_000_000),
            Err(SerialError::InvalidBaudrate(4_000_000))
        );
        assert_eq!(
            Config::new().baudrate(10).divisor(100_000_000),
            Err(SerialError::InvalidBaudrate(10))
        );
    }
}
