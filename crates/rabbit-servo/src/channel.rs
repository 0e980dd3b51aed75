//! 通道表
//!
//! 每个通道记录标定范围、当前脉宽（逻辑值）以及最后写入硬件的脉宽。
//! 逻辑值由调用线程和调度线程共同维护；硬件值只由调度线程更新。

use crate::config::{RangeConfig, ServoConfig};
use crate::error::ServoError;

/// 单个通道状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Channel {
    pub lo: u32,
    pub hi: u32,
    /// 当前脉宽（µs）
    pub pulse: u32,
    /// 是否已经被驱动过（从未驱动的通道不会写硬件）
    pub driven: bool,
    /// 最后成功写入硬件的脉宽
    pub written: Option<u32>,
}

impl Channel {
    fn new(range: RangeConfig) -> Self {
        Self {
            lo: range.lo,
            hi: range.hi,
            pulse: 0,
            driven: false,
            written: None,
        }
    }

    #[inline]
    pub fn clamp(&self, pulse: u32) -> u32 {
        pulse.clamp(self.lo, self.hi)
    }

    /// 百分比（0..=100，超出部分截断）对应的脉宽
    pub fn percent_pulse(&self, pct: u32) -> u32 {
        let pct = u64::from(pct.min(100));
        let span = u64::from(self.hi - self.lo);
        // span * pct / 100 <= span，结果不会超过 hi
        (span * pct / 100) as u32 + self.lo
    }

    pub fn center_pulse(&self) -> u32 {
        self.lo + (self.hi - self.lo) / 2
    }

    /// 是否需要写硬件
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.driven && self.written != Some(self.pulse)
    }
}

/// 通道表
#[derive(Debug)]
pub(crate) struct ChannelTable {
    channels: Vec<Channel>,
}

impl ChannelTable {
    /// 按配置创建通道表（应用默认范围和标定表）
    pub fn from_config(config: &ServoConfig) -> Self {
        let mut channels = vec![Channel::new(config.default_range); config.channel_count()];
        for entry in &config.channels {
            if let Some(channel) = channels.get_mut(entry.channel) {
                channel.lo = entry.lo;
                channel.hi = entry.hi;
            }
        }
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn get(&self, channel: usize) -> Result<&Channel, ServoError> {
        let count = self.channels.len();
        self.channels
            .get(channel)
            .ok_or(ServoError::InvalidChannel { channel, count })
    }

    pub fn get_mut(&mut self, channel: usize) -> Result<&mut Channel, ServoError> {
        let count = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(ServoError::InvalidChannel { channel, count })
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Channel)> {
        self.channels.iter().enumerate()
    }

    /// 设置标定范围
    ///
    /// 已驱动的通道会被重新截断到新范围内（由调度线程写入硬件）。
    pub fn set_range(&mut self, channel: usize, lo: u32, hi: u32) -> Result<(), ServoError> {
        let entry = self.get_mut(channel)?;
        if lo >= hi {
            return Err(ServoError::InvalidRange { channel, lo, hi });
        }
        entry.lo = lo;
        entry.hi = hi;
        if entry.driven {
            entry.pulse = entry.clamp(entry.pulse);
        }
        Ok(())
    }

    /// 设置逻辑脉宽，返回实际生效的值
    pub fn set_pulse(
        &mut self,
        channel: usize,
        pulse: u32,
        ignore_range: bool,
    ) -> Result<u32, ServoError> {
        let entry = self.get_mut(channel)?;
        let pulse = if ignore_range {
            pulse
        } else {
            entry.clamp(pulse)
        };
        entry.pulse = pulse;
        entry.driven = true;
        Ok(pulse)
    }

    /// 芯片重新上线后，其通道的硬件值不再可信
    pub fn invalidate_written(&mut self, channels: std::ops::Range<usize>) {
        for channel in self.channels[channels].iter_mut() {
            channel.written = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;

    fn table() -> ChannelTable {
        let mut config = ServoConfig::default();
        config.chip_addresses = vec![0x40];
        config.channels.push(ChannelConfig {
            channel: 1,
            lo: 530,
            hi: 2580,
            center: false,
        });
        ChannelTable::from_config(&config)
    }

    #[test]
    fn test_from_config() {
        let table = table();
        assert_eq!(table.len(), 16);
        let ch0 = table.get(0).unwrap();
        assert_eq!((ch0.lo, ch0.hi, ch0.pulse, ch0.driven), (450, 2500, 0, false));
        let ch1 = table.get(1).unwrap();
        assert_eq!((ch1.lo, ch1.hi), (530, 2580));
        assert!(matches!(
            table.get(16),
            Err(ServoError::InvalidChannel {
                channel: 16,
                count: 16
            })
        ));
    }

    #[test]
    fn test_set_range() {
        let mut table = table();
        table.set_range(0, 500, 2500).unwrap();
        assert_eq!(table.get(0).unwrap().lo, 500);

        // lo >= hi 被拒绝，原值保留
        assert!(matches!(
            table.set_range(0, 2500, 2500),
            Err(ServoError::InvalidRange { channel: 0, .. })
        ));
        assert!(table.set_range(0, 3000, 1000).is_err());
        assert_eq!(table.get(0).unwrap().hi, 2500);

        assert!(table.set_range(99, 500, 2500).is_err());
    }

    #[test]
    fn test_set_range_reclamps_driven_channel() {
        let mut table = table();
        table.set_pulse(0, 2400, false).unwrap();
        table.set_range(0, 500, 2000).unwrap();
        assert_eq!(table.get(0).unwrap().pulse, 2000);

        // 未驱动的通道保持 0
        table.set_range(2, 500, 2000).unwrap();
        assert_eq!(table.get(2).unwrap().pulse, 0);
    }

    #[test]
    fn test_set_pulse_clamps() {
        let mut table = table();
        assert_eq!(table.set_pulse(0, 100, false).unwrap(), 450);
        assert_eq!(table.set_pulse(0, 9000, false).unwrap(), 2500);
        assert_eq!(table.set_pulse(0, 1500, false).unwrap(), 1500);
        // 标定探测时忽略范围
        assert_eq!(table.set_pulse(0, 100, true).unwrap(), 100);
        assert!(table.get(0).unwrap().driven);
    }

    #[test]
    fn test_percent_and_center() {
        let mut table = table();
        table.set_range(0, 500, 2500).unwrap();
        let ch = table.get(0).unwrap();
        assert_eq!(ch.percent_pulse(0), 500);
        assert_eq!(ch.percent_pulse(50), 1500);
        assert_eq!(ch.percent_pulse(100), 2500);
        assert_eq!(ch.percent_pulse(250), 2500);
        assert_eq!(ch.center_pulse(), 1500);
    }

    #[test]
    fn test_percent_and_center_wide_range() {
        let mut table = table();
        table.set_range(0, 0, 100_000_000).unwrap();
        let ch = table.get(0).unwrap();
        assert_eq!(ch.percent_pulse(50), 50_000_000);
        assert_eq!(ch.percent_pulse(100), 100_000_000);

        table.set_range(1, 3_000_000_000, u32::MAX).unwrap();
        let ch = table.get(1).unwrap();
        assert_eq!(ch.center_pulse(), 3_000_000_000 + (u32::MAX - 3_000_000_000) / 2);
        assert_eq!(ch.percent_pulse(100), u32::MAX);
        assert_eq!(ch.percent_pulse(0), 3_000_000_000);
    }

    #[test]
    fn test_stale_tracking() {
        let mut table = table();
        assert!(!table.get(0).unwrap().is_stale());

        table.set_pulse(0, 1500, false).unwrap();
        assert!(table.get(0).unwrap().is_stale());

        table.get_mut(0).unwrap().written = Some(1500);
        assert!(!table.get(0).unwrap().is_stale());

        table.invalidate_written(0..16);
        assert!(table.get(0).unwrap().is_stale());
    }
}
