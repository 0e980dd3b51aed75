//! PWM 总线
//!
//! 一组芯片槽位，按通道号定位芯片：通道 `c` 位于第 `c / channels_per_chip` 个芯片的
//! 第 `c % channels_per_chip` 路输出。总线由调度线程独占，不需要加锁。

use rabbit_pwm::pca9685::pulse_to_off_count;
use rabbit_pwm::{Connector, DeviceSlot, ProbeOutcome, PwmChip, PwmError};
use smallvec::SmallVec;
use std::ops::Range;
use tracing::{debug, warn};

/// 本次探测中刚刚（重新）上线的芯片
pub(crate) type Reconnected = SmallVec<[usize; 4]>;

pub(crate) struct PwmBus<C: Connector> {
    slots: Vec<DeviceSlot<C>>,
    channels_per_chip: usize,
    frequency_hz: u32,
}

impl<C> PwmBus<C>
where
    C: Connector,
    C::Device: PwmChip,
{
    pub fn new(connectors: Vec<C>, channels_per_chip: usize, frequency_hz: u32) -> Self {
        Self {
            slots: connectors.into_iter().map(DeviceSlot::new).collect(),
            channels_per_chip,
            frequency_hz,
        }
    }

    pub fn chip_count(&self) -> usize {
        self.slots.len()
    }

    pub fn channel_count(&self) -> usize {
        self.slots.len() * self.channels_per_chip
    }

    /// 通道所在的 `(芯片, 芯片内通道)`
    #[inline]
    pub fn locate(&self, channel: usize) -> (usize, usize) {
        (
            channel / self.channels_per_chip,
            channel % self.channels_per_chip,
        )
    }

    /// 芯片负责的通道范围
    pub fn channel_range(&self, chip: usize) -> Range<usize> {
        let start = chip * self.channels_per_chip;
        start..start + self.channels_per_chip
    }

    pub fn is_online(&self, chip: usize) -> bool {
        self.slots.get(chip).is_some_and(DeviceSlot::is_online)
    }

    /// 尝试打开所有离线芯片，返回刚刚上线的芯片
    pub fn probe_all(&mut self) -> Reconnected {
        let mut reconnected = Reconnected::new();
        for (chip, slot) in self.slots.iter_mut().enumerate() {
            if slot.probe() == ProbeOutcome::Connected {
                reconnected.push(chip);
            }
        }
        reconnected
    }

    /// 写入一个通道的脉宽
    ///
    /// 芯片离线时返回 `PwmError::Offline`（不做 I/O）；写入失败时芯片被标记为离线。
    pub fn write_pulse(&mut self, channel: usize, pulse: u32) -> Result<(), PwmError> {
        let count = self.channel_count();
        let (chip, offset) = self.locate(channel);
        let slot = self
            .slots
            .get_mut(chip)
            .ok_or(PwmError::InvalidChannel { channel, count })?;
        let off = pulse_to_off_count(pulse, self.frequency_hz);
        slot.with_device(|device| device.set_pwm(offset, 0, off))
    }

    /// 让所有在线芯片休眠并关闭
    pub fn shutdown(&mut self) {
        for slot in &mut self.slots {
            if !slot.is_online() {
                continue;
            }
            match slot.with_device(|device| device.sleep()) {
                Ok(()) => debug!("{} put to sleep", slot.label()),
                Err(e) => warn!("Failed to put {} to sleep: {}", slot.label(), e),
            }
            slot.close();
        }
    }
}
