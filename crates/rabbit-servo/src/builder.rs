//! Builder 模式实现
//!
//! 提供链式构造 `Servos` 实例的便捷方式。

use crate::config::ServoConfig;
use crate::error::ServoError;
use crate::servos::Servos;
use rabbit_pwm::pca9685::Pca9685Connector;
use std::path::Path;

#[cfg(feature = "mock")]
use rabbit_pwm::{MockChip, MockConnector};

/// 总线后端
#[derive(Debug, Clone)]
enum Backend {
    /// Linux i2c-dev（`/dev/i2c-<bus>`）
    I2c,
    /// 内存模拟芯片，每个芯片地址对应一个
    #[cfg(feature = "mock")]
    Mock(Vec<MockChip>),
}

/// Servos Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use rabbit_servo::ServosBuilder;
///
/// // 默认配置：i2c-1 上的 0x40 / 0x41 两个 PCA9685
/// let servos = ServosBuilder::new().build()?;
///
/// // 从配置文件加载标定表
/// let servos = ServosBuilder::new()
///     .config_file("/etc/rabbit/servos.toml")?
///     .build()?;
/// # Ok::<(), rabbit_servo::ServoError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ServosBuilder {
    config: ServoConfig,
    backend: Backend,
}

impl Default for ServosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServosBuilder {
    pub fn new() -> Self {
        Self {
            config: ServoConfig::default(),
            backend: Backend::I2c,
        }
    }

    /// 使用完整配置
    pub fn config(mut self, config: ServoConfig) -> Self {
        self.config = config;
        self
    }

    /// 从 TOML 文件加载配置
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ServoError> {
        self.config = ServoConfig::load_from_file(path)?;
        Ok(self)
    }

    /// 设置调度周期（毫秒）
    pub fn tick_ms(mut self, tick_ms: u64) -> Self {
        self.config.tick_ms = tick_ms;
        self
    }

    /// 设置关闭时的排空超时（毫秒）
    pub fn drain_timeout_ms(mut self, drain_timeout_ms: u64) -> Self {
        self.config.drain_timeout_ms = drain_timeout_ms;
        self
    }

    /// 使用模拟芯片（数量必须与配置中的芯片地址数一致）
    #[cfg(feature = "mock")]
    pub fn mock(mut self, chips: Vec<MockChip>) -> Self {
        self.backend = Backend::Mock(chips);
        self
    }

    pub fn config_ref(&self) -> &ServoConfig {
        &self.config
    }

    /// 构建 Servos 实例并启动调度线程
    ///
    /// # Errors
    /// - `ServoError::Config`: 配置无效
    /// - `ServoError::Unsupported`: 当前平台没有 i2c-dev
    /// - `ServoError::SchedulerThread`: 调度线程启动失败
    pub fn build(self) -> Result<Servos, ServoError> {
        self.config.validate()?;

        match self.backend {
            Backend::I2c => build_i2c(&self.config),
            #[cfg(feature = "mock")]
            Backend::Mock(chips) => {
                if chips.len() != self.config.chip_addresses.len() {
                    return Err(ServoError::Config(format!(
                        "{} mock chip(s) given for {} chip address(es)",
                        chips.len(),
                        self.config.chip_addresses.len()
                    )));
                }
                let frequency_hz = self.config.frequency_hz;
                let connectors = chips
                    .into_iter()
                    .zip(&self.config.chip_addresses)
                    .map(|(chip, address)| {
                        Pca9685Connector::new(
                            MockConnector::new(chip, format!("mock@0x{:02x}", address)),
                            frequency_hz,
                        )
                    })
                    .collect();
                Servos::start(&self.config, connectors)
            },
        }
    }
}

#[cfg(target_os = "linux")]
fn build_i2c(config: &ServoConfig) -> Result<Servos, ServoError> {
    use rabbit_pwm::I2cConnector;

    let connectors = config
        .chip_addresses
        .iter()
        .map(|&address| {
            Pca9685Connector::new(
                I2cConnector::new(config.i2c_bus, address),
                config.frequency_hz,
            )
        })
        .collect();
    Servos::start(config, connectors)
}

#[cfg(not(target_os = "linux"))]
fn build_i2c(_config: &ServoConfig) -> Result<Servos, ServoError> {
    Err(ServoError::Unsupported(
        "the I2C backend requires Linux i2c-dev".into(),
    ))
}
