//! PCA9685 16 通道 PWM 驱动
//!
//! 参考：
//! - <https://www.nxp.com/docs/en/data-sheet/PCA9685.pdf>
//! - <https://www.waveshare.com/wiki/Servo_Driver_HAT>

use crate::{Connector, PwmChip, PwmDeviceError, PwmDeviceErrorKind, PwmError, RegisterIo};
use std::time::Duration;
use tracing::debug;

pub const MODE1_REG: u8 = 0x00;
pub const MODE1_RESTART: u8 = 0x80;
pub const MODE1_SLEEP: u8 = 0x10;
pub const MODE1_ALLCALL: u8 = 0x01;
pub const MODE2_REG: u8 = 0x01;
pub const MODE2_OUTDRV: u8 = 0x04;
pub const PRE_SCALE_REG: u8 = 0xfe;

/// 每个芯片的通道数
pub const CHANNELS: usize = 16;

/// PWM 计数分辨率（12 位）
pub const RESOLUTION: u32 = 4096;

/// 内部振荡器频率
pub const OSCILLATOR_HZ: u32 = 25_000_000;

/// 唤醒后振荡器稳定时间
const OSCILLATOR_SETTLE: Duration = Duration::from_micros(500);

#[inline]
pub const fn led_on_l_reg(channel: usize) -> u8 {
    (channel * 4 + 0x06) as u8
}

#[inline]
pub const fn led_on_h_reg(channel: usize) -> u8 {
    (channel * 4 + 0x07) as u8
}

#[inline]
pub const fn led_off_l_reg(channel: usize) -> u8 {
    (channel * 4 + 0x08) as u8
}

#[inline]
pub const fn led_off_h_reg(channel: usize) -> u8 {
    (channel * 4 + 0x09) as u8
}

/// 计算 PRE_SCALE 寄存器值：`round(osc / (4096 * freq)) - 1`
pub fn prescale_for(frequency_hz: u32) -> u8 {
    let prescale = OSCILLATOR_HZ as f64 / RESOLUTION as f64 / frequency_hz.max(1) as f64 - 1.0;
    // 芯片允许的范围是 3..=255
    (prescale + 0.5).floor().clamp(3.0, 255.0) as u8
}

/// 脉宽（µs）转换为 OFF 计数，上限为 `RESOLUTION - 1`
///
/// ```
/// use rabbit_pwm::pca9685::pulse_to_off_count;
///
/// // 50Hz 周期 20000µs，1500µs 对应 307 个计数
/// assert_eq!(pulse_to_off_count(1500, 50), 307);
/// ```
pub fn pulse_to_off_count(pulse_us: u32, frequency_hz: u32) -> u16 {
    let period_us = (1_000_000 / frequency_hz.max(1)).max(1) as u64;
    let off = pulse_us as u64 * RESOLUTION as u64 / period_us;
    off.min(RESOLUTION as u64 - 1) as u16
}

/// PCA9685 芯片
pub struct Pca9685<R: RegisterIo> {
    io: R,
    frequency_hz: u32,
}

impl<R: RegisterIo> Pca9685<R> {
    /// 在已打开的寄存器接口上初始化芯片
    ///
    /// 初始化顺序：探测 MODE1 → 休眠 → 写 PRE_SCALE → 图腾柱输出 → 唤醒 → RESTART
    pub fn init(mut io: R, frequency_hz: u32) -> Result<Self, PwmError> {
        // 探测：读不到 MODE1 说明地址上没有芯片
        io.read_reg(MODE1_REG)?;

        let prescale = prescale_for(frequency_hz);
        io.write_reg(MODE1_REG, MODE1_SLEEP | MODE1_ALLCALL)?;
        io.write_reg(PRE_SCALE_REG, prescale)?;
        io.write_reg(MODE2_REG, MODE2_OUTDRV)?;
        io.write_reg(MODE1_REG, MODE1_ALLCALL)?;
        spin_sleep::sleep(OSCILLATOR_SETTLE);
        io.write_reg(MODE1_REG, MODE1_RESTART | MODE1_ALLCALL)?;

        debug!(
            "PCA9685 initialised: frequency={}Hz prescale={}",
            frequency_hz, prescale
        );

        Ok(Self { io, frequency_hz })
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

impl<R: RegisterIo> PwmChip for Pca9685<R> {
    fn set_pwm(&mut self, channel: usize, on: u16, off: u16) -> Result<(), PwmError> {
        if channel >= CHANNELS {
            return Err(PwmError::InvalidChannel {
                channel,
                count: CHANNELS,
            });
        }

        self.io.write_reg(led_on_l_reg(channel), (on & 0xff) as u8)?;
        self.io.write_reg(led_on_h_reg(channel), (on >> 8) as u8)?;
        self.io.write_reg(led_off_l_reg(channel), (off & 0xff) as u8)?;
        self.io.write_reg(led_off_h_reg(channel), (off >> 8) as u8)?;
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), PwmError> {
        self.io.write_reg(MODE1_REG, MODE1_SLEEP)
    }
}

/// PCA9685 连接器：打开底层寄存器接口并完成芯片初始化
pub struct Pca9685Connector<C> {
    inner: C,
    frequency_hz: u32,
}

impl<C> Pca9685Connector<C> {
    pub fn new(inner: C, frequency_hz: u32) -> Self {
        Self {
            inner,
            frequency_hz,
        }
    }
}

impl<C> Connector for Pca9685Connector<C>
where
    C: Connector,
    C::Device: RegisterIo,
{
    type Device = Pca9685<C::Device>;

    fn connect(&mut self) -> Result<Self::Device, PwmError> {
        if self.frequency_hz == 0 {
            return Err(PwmDeviceError::new(
                PwmDeviceErrorKind::Backend,
                "PWM frequency must be non-zero",
            )
            .into());
        }
        let io = self.inner.connect()?;
        Pca9685::init(io, self.frequency_hz)
    }

    fn label(&self) -> String {
        format!("pca9685 {}", self.inner.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChip, MockConnector};

    #[test]
    fn test_register_layout() {
        assert_eq!(led_on_l_reg(0), 0x06);
        assert_eq!(led_off_h_reg(0), 0x09);
        assert_eq!(led_on_l_reg(15), 0x42);
        assert_eq!(led_off_h_reg(15), 0x45);
    }

    #[test]
    fn test_prescale() {
        // 25MHz / 4096 / 50Hz - 1 = 121.07
        assert_eq!(prescale_for(50), 121);
        // 上限
        assert_eq!(prescale_for(1), 255);
        // 下限
        assert_eq!(prescale_for(100_000), 3);
    }

    #[test]
    fn test_pulse_to_off_count() {
        assert_eq!(pulse_to_off_count(0, 50), 0);
        assert_eq!(pulse_to_off_count(500, 50), 102);
        assert_eq!(pulse_to_off_count(2500, 50), 512);
        // 超出一个周期时截断到 4095
        assert_eq!(pulse_to_off_count(20_000, 50), 4095);
        assert_eq!(pulse_to_off_count(1_000_000, 50), 4095);
    }

    #[test]
    fn test_init_sequence() {
        let chip = MockChip::new();
        let mut connector =
            Pca9685Connector::new(MockConnector::new(chip.clone(), "mock@0x40"), 50);
        let pca = connector.connect().unwrap();

        assert_eq!(pca.frequency_hz(), 50);
        assert_eq!(chip.register(PRE_SCALE_REG), 121);
        assert_eq!(chip.register(MODE2_REG), MODE2_OUTDRV);
        assert_eq!(chip.register(MODE1_REG), MODE1_RESTART | MODE1_ALLCALL);
        assert!(connector.label().contains("mock@0x40"));
    }

    #[test]
    fn test_init_absent_chip() {
        let chip = MockChip::new();
        chip.set_present(false);
        let mut connector = Pca9685Connector::new(MockConnector::new(chip, "mock@0x41"), 50);
        assert!(connector.connect().is_err());
    }

    #[test]
    fn test_set_pwm_writes_four_registers() {
        let chip = MockChip::new();
        let mut connector = Pca9685Connector::new(MockConnector::new(chip.clone(), "mock"), 50);
        let mut pca = connector.connect().unwrap();

        let before = chip.write_count();
        pca.set_pwm(3, 0, 0x0133).unwrap();
        assert_eq!(chip.write_count() - before, 4);
        assert_eq!(chip.register(led_on_l_reg(3)), 0);
        assert_eq!(chip.register(led_on_h_reg(3)), 0);
        assert_eq!(chip.register(led_off_l_reg(3)), 0x33);
        assert_eq!(chip.register(led_off_h_reg(3)), 0x01);
        assert_eq!(chip.off_count(3), 0x0133);

        assert!(matches!(
            pca.set_pwm(16, 0, 0),
            Err(PwmError::InvalidChannel { channel: 16, .. })
        ));
    }

    #[test]
    fn test_sleep() {
        let chip = MockChip::new();
        let mut connector = Pca9685Connector::new(MockConnector::new(chip.clone(), "mock"), 50);
        let mut pca = connector.connect().unwrap();
        pca.sleep().unwrap();
        assert_eq!(chip.register(MODE1_REG), MODE1_SLEEP);
    }
}
