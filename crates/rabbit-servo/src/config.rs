//! 舵机调度配置
//!
//! 支持从 TOML 文件加载，所有字段都有默认值：
//!
//! ```toml
//! tick_ms = 50
//! frequency_hz = 50
//! i2c_bus = 1
//! chip_addresses = [0x40, 0x41]
//!
//! [default_range]
//! lo = 450
//! hi = 2500
//!
//! [[channels]]
//! channel = 0
//! lo = 530
//! hi = 2580
//! center = true
//! ```

use crate::error::ServoError;
use crate::sync::ChannelMask;
use rabbit_pwm::pca9685;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 标定范围（µs）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub lo: u32,
    pub hi: u32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self { lo: 450, hi: 2500 }
    }
}

/// 单个通道的标定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: usize,
    pub lo: u32,
    pub hi: u32,
    /// 启动时是否居中
    #[serde(default)]
    pub center: bool,
}

/// 舵机调度配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// 调度周期（毫秒）
    pub tick_ms: u64,
    /// PWM 频率（Hz），舵机通常为 50Hz
    pub frequency_hz: u32,
    /// 每个芯片使用的通道数（不超过 PCA9685 的 16 路）
    pub channels_per_chip: usize,
    /// i2c 总线号（`/dev/i2c-<bus>`）
    pub i2c_bus: u8,
    /// 芯片地址，顺序决定通道编号（第 n 个芯片负责 `n * channels_per_chip ..`）
    pub chip_addresses: Vec<u16>,
    /// 未单独标定的通道使用的范围
    pub default_range: RangeConfig,
    /// 关闭时等待运动完成的最长时间（毫秒）
    pub drain_timeout_ms: u64,
    /// 通道标定表
    pub channels: Vec<ChannelConfig>,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            frequency_hz: 50,
            channels_per_chip: 16,
            i2c_bus: 1,
            chip_addresses: vec![0x40, 0x41],
            default_range: RangeConfig::default(),
            drain_timeout_ms: 30_000,
            channels: Vec::new(),
        }
    }
}

impl ServoConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServoError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串解析配置（会执行校验）
    pub fn from_toml_str(content: &str) -> Result<Self, ServoError> {
        let config: ServoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 通道总数
    pub fn channel_count(&self) -> usize {
        self.chip_addresses.len() * self.channels_per_chip
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ServoError> {
        if self.tick_ms == 0 {
            return Err(ServoError::Config("tick_ms must be non-zero".into()));
        }
        if self.frequency_hz == 0 {
            return Err(ServoError::Config("frequency_hz must be non-zero".into()));
        }
        if self.channels_per_chip == 0 {
            return Err(ServoError::Config(
                "channels_per_chip must be non-zero".into(),
            ));
        }
        if self.channels_per_chip > pca9685::CHANNELS {
            return Err(ServoError::Config(format!(
                "channels_per_chip {} exceeds the PCA9685 channel count {}",
                self.channels_per_chip,
                pca9685::CHANNELS
            )));
        }
        if self.chip_addresses.is_empty() {
            return Err(ServoError::Config("at least one chip is required".into()));
        }
        let count = self.channel_count();
        if count > ChannelMask::CAPACITY {
            return Err(ServoError::Config(format!(
                "{} channels exceed the maximum of {}",
                count,
                ChannelMask::CAPACITY
            )));
        }
        for (i, address) in self.chip_addresses.iter().enumerate() {
            if self.chip_addresses[..i].contains(address) {
                return Err(ServoError::Config(format!(
                    "duplicate chip address 0x{:02x}",
                    address
                )));
            }
        }
        if self.default_range.lo >= self.default_range.hi {
            return Err(ServoError::Config(format!(
                "default_range lo {} >= hi {}",
                self.default_range.lo, self.default_range.hi
            )));
        }

        let mut seen = ChannelMask::EMPTY;
        for entry in &self.channels {
            if entry.channel >= count {
                return Err(ServoError::InvalidChannel {
                    channel: entry.channel,
                    count,
                });
            }
            if entry.lo >= entry.hi {
                return Err(ServoError::InvalidRange {
                    channel: entry.channel,
                    lo: entry.lo,
                    hi: entry.hi,
                });
            }
            if seen.contains(entry.channel) {
                return Err(ServoError::Config(format!(
                    "channel {} calibrated twice",
                    entry.channel
                )));
            }
            seen = seen.with(entry.channel);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServoConfig::default();
        assert_eq!(config.tick_ms, 50);
        assert_eq!(config.frequency_hz, 50);
        assert_eq!(config.channel_count(), 32);
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.default_range, RangeConfig { lo: 450, hi: 2500 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = ServoConfig::from_toml_str(
            r#"
            tick_ms = 20
            chip_addresses = [0x40]

            [[channels]]
            channel = 0
            lo = 530
            hi = 2580
            center = true

            [[channels]]
            channel = 3
            lo = 510
            hi = 2560
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_ms, 20);
        assert_eq!(config.frequency_hz, 50);
        assert_eq!(config.channel_count(), 16);
        assert_eq!(config.channels.len(), 2);
        assert!(config.channels[0].center);
        assert!(!config.channels[1].center);
    }

    #[test]
    fn test_validate_rejects() {
        let bad = |f: fn(&mut ServoConfig)| {
            let mut config = ServoConfig::default();
            f(&mut config);
            config.validate().unwrap_err()
        };

        assert!(matches!(bad(|c| c.tick_ms = 0), ServoError::Config(_)));
        assert!(matches!(bad(|c| c.frequency_hz = 0), ServoError::Config(_)));
        assert!(matches!(bad(|c| c.chip_addresses.clear()), ServoError::Config(_)));
        assert!(matches!(bad(|c| c.channels_per_chip = 0), ServoError::Config(_)));
        assert!(matches!(bad(|c| c.channels_per_chip = 20), ServoError::Config(_)));
        assert!(matches!(
            bad(|c| c.chip_addresses = vec![0x40, 0x40]),
            ServoError::Config(_)
        ));
        assert!(matches!(
            bad(|c| c.chip_addresses = vec![0x40, 0x41, 0x42, 0x43, 0x44]),
            ServoError::Config(_)
        ));
        assert!(matches!(
            bad(|c| c.default_range = RangeConfig { lo: 2500, hi: 2500 }),
            ServoError::Config(_)
        ));
        assert!(matches!(
            bad(|c| c.channels.push(ChannelConfig {
                channel: 32,
                lo: 500,
                hi: 2500,
                center: false
            })),
            ServoError::InvalidChannel { channel: 32, .. }
        ));
        assert!(matches!(
            bad(|c| c.channels.push(ChannelConfig {
                channel: 1,
                lo: 2500,
                hi: 500,
                center: false
            })),
            ServoError::InvalidRange { channel: 1, .. }
        ));
        assert!(matches!(
            bad(|c| {
                let entry = ChannelConfig {
                    channel: 2,
                    lo: 500,
                    hi: 2500,
                    center: false,
                };
                c.channels.push(entry);
                c.channels.push(entry);
            }),
            ServoError::Config(_)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "frequency_hz = 60\ndrain_timeout_ms = 1000").unwrap();

        let config = ServoConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.frequency_hz, 60);
        assert_eq!(config.drain_timeout(), Duration::from_secs(1));

        assert!(matches!(
            ServoConfig::load_from_file("/nonexistent/rabbit.toml"),
            Err(ServoError::Io(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            ServoConfig::from_toml_str("tick_ms = \"fast\""),
            Err(ServoError::Toml(_))
        ));
    }

    #[test]
    fn test_example_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/servos.toml");
        let config = ServoConfig::load_from_file(path).unwrap();
        assert_eq!(config.channel_count(), 32);
        assert_eq!(config.channels.len(), 3);
        assert!(config.channels.iter().all(|c| c.center));
    }
}
