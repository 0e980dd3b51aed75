//! Linux i2c-dev 后端
//!
//! 通过 `/dev/i2c-<bus>` 访问芯片：`ioctl(I2C_SLAVE)` 选择从机地址，
//! 之后用普通的 `write`/`read` 完成寄存器访问。

use crate::{Connector, PwmDeviceError, PwmDeviceErrorKind, PwmError, RegisterIo};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

// linux/i2c-dev.h
nix::ioctl_write_int_bad!(i2c_set_slave, 0x0703);

/// 把 I/O 错误映射为结构化设备错误
fn classify(err: io::Error, context: &str) -> PwmError {
    let kind = match err.raw_os_error() {
        // 地址无应答（NACK）
        Some(libc::ENXIO) | Some(libc::EREMOTEIO) => PwmDeviceErrorKind::NoDevice,
        Some(libc::EBUSY) => PwmDeviceErrorKind::Busy,
        Some(libc::ENOENT) => PwmDeviceErrorKind::NotFound,
        Some(libc::EACCES) | Some(libc::EPERM) => PwmDeviceErrorKind::AccessDenied,
        _ => return PwmError::Io(err),
    };
    PwmDeviceError::new(kind, format!("{}: {}", context, err)).into()
}

/// 已选择从机地址的 i2c 设备
#[derive(Debug)]
pub struct I2cDevice {
    file: File,
    address: u16,
}

impl I2cDevice {
    /// 打开总线并绑定从机地址
    pub fn open(bus: u8, address: u16) -> Result<Self, PwmError> {
        let path = PathBuf::from(format!("/dev/i2c-{}", bus));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| classify(e, &path.display().to_string()))?;

        // SAFETY: fd 在 `file` 生命周期内有效，I2C_SLAVE 只接受一个整型参数
        unsafe { i2c_set_slave(file.as_raw_fd(), address as libc::c_int) }.map_err(|errno| {
            classify(
                io::Error::from_raw_os_error(errno as i32),
                &format!("I2C_SLAVE 0x{:02x}", address),
            )
        })?;

        Ok(Self { file, address })
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl RegisterIo for I2cDevice {
    fn read_reg(&mut self, reg: u8) -> Result<u8, PwmError> {
        let mut value = [0u8; 1];
        self.file
            .write_all(&[reg])
            .and_then(|_| self.file.read_exact(&mut value))
            .map_err(|e| classify(e, &format!("read reg 0x{:02x}", reg)))?;
        Ok(value[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), PwmError> {
        self.file
            .write_all(&[reg, value])
            .map_err(|e| classify(e, &format!("write reg 0x{:02x}", reg)))
    }
}

/// i2c-dev 连接器
#[derive(Debug, Clone)]
pub struct I2cConnector {
    bus: u8,
    address: u16,
}

impl I2cConnector {
    pub fn new(bus: u8, address: u16) -> Self {
        Self { bus, address }
    }
}

impl Connector for I2cConnector {
    type Device = I2cDevice;

    fn connect(&mut self) -> Result<Self::Device, PwmError> {
        I2cDevice::open(self.bus, self.address)
    }

    fn label(&self) -> String {
        format!("i2c-{}@0x{:02x}", self.bus, self.address)
    }
}
