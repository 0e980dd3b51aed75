//! # Rabbit PWM Adapter Layer
//!
//! PWM 驱动芯片抽象层，提供统一的寄存器读写接口和芯片生命周期管理。
//!
//! 分层结构（从底层到高层）：
//!
//! - [`RegisterIo`]: 字节寄存器读写（Linux i2c-dev / Mock）
//! - [`Connector`]: 惰性打开设备（可重复调用，用于断线重连）
//! - [`PwmChip`]: 芯片级操作（设置通道 ON/OFF 计数、休眠）
//! - [`DeviceSlot`]: 设备槽位，负责探测打开、出错下线、下个周期重试

use thiserror::Error;

pub mod lifecycle;
pub mod pca9685;

#[cfg(target_os = "linux")]
pub mod i2c;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use lifecycle::{DeviceSlot, ProbeOutcome};
pub use pca9685::{Pca9685, Pca9685Connector};

#[cfg(target_os = "linux")]
pub use i2c::{I2cConnector, I2cDevice};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockChip, MockConnector, MockRegisters};

/// PWM 适配层统一错误类型
#[derive(Error, Debug)]
pub enum PwmError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] PwmDeviceError),
    #[error("Device offline")]
    Offline,
    #[error("Invalid channel {channel} (chip has {count} channels)")]
    InvalidChannel { channel: usize, count: usize },
}

impl PwmError {
    /// 重试也不会恢复的错误（总线不存在或无权限）
    pub fn is_fatal(&self) -> bool {
        matches!(self, PwmError::Device(e) if e.is_fatal())
    }

    /// 调用方传入的参数错误，与硬件状态无关
    pub fn is_caller_error(&self) -> bool {
        matches!(self, PwmError::InvalidChannel { .. })
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    InvalidResponse,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct PwmDeviceError {
    pub kind: PwmDeviceErrorKind,
    pub message: String,
}

impl PwmDeviceError {
    pub fn new(kind: PwmDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 总线本身不存在或无权限访问，重试也不会恢复
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            PwmDeviceErrorKind::NotFound | PwmDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for PwmDeviceError {
    fn from(message: String) -> Self {
        Self::new(PwmDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for PwmDeviceError {
    fn from(message: &str) -> Self {
        Self::new(PwmDeviceErrorKind::Unknown, message)
    }
}

/// 字节寄存器读写接口
pub trait RegisterIo {
    fn read_reg(&mut self, reg: u8) -> Result<u8, PwmError>;
    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), PwmError>;
}

/// 设备连接器
///
/// 每次调用 `connect()` 都会尝试打开一个新的设备句柄，失败时返回错误，
/// 由 [`DeviceSlot`] 在下一个周期重试。
pub trait Connector {
    type Device;

    fn connect(&mut self) -> Result<Self::Device, PwmError>;

    /// 用于日志的设备描述（如 `i2c-1@0x40`）
    fn label(&self) -> String;
}

/// PWM 芯片接口
pub trait PwmChip {
    /// 设置通道的 ON/OFF 计数（12 位）
    fn set_pwm(&mut self, channel: usize, on: u16, off: u16) -> Result<(), PwmError>;

    /// 让芯片进入低功耗休眠（输出关闭）
    fn sleep(&mut self) -> Result<(), PwmError>;
}
