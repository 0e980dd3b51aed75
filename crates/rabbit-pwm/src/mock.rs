//! Mock 后端
//!
//! 内存中的寄存器文件，模拟一个挂在总线上的芯片。支持：
//! - 在线/离线切换（模拟拔插、掉电）
//! - 注入写失败（模拟总线瞬时错误）
//!
//! `MockChip` 是共享句柄，测试代码持有一份克隆来观察调度线程写入的寄存器。

use crate::pca9685::{led_off_h_reg, led_off_l_reg};
use crate::{Connector, PwmDeviceError, PwmDeviceErrorKind, PwmError, RegisterIo};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct MockChipState {
    present: bool,
    registers: [u8; 256],
    fail_writes: usize,
    writes: u64,
    connects: u64,
}

/// 模拟芯片（可克隆的共享句柄）
#[derive(Debug, Clone)]
pub struct MockChip {
    inner: Arc<Mutex<MockChipState>>,
}

impl Default for MockChip {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChip {
    /// 创建一个在线的芯片，寄存器全部为 0
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockChipState {
                present: true,
                registers: [0; 256],
                fail_writes: 0,
                writes: 0,
                connects: 0,
            })),
        }
    }

    /// 设置芯片是否在总线上
    pub fn set_present(&self, present: bool) {
        self.inner.lock().present = present;
    }

    pub fn is_present(&self) -> bool {
        self.inner.lock().present
    }

    /// 让接下来的 `count` 次寄存器写入失败
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.lock().fail_writes = count;
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.inner.lock().registers[reg as usize]
    }

    /// 读取通道的 12 位 OFF 计数
    pub fn off_count(&self, channel: usize) -> u16 {
        let state = self.inner.lock();
        let lo = state.registers[led_off_l_reg(channel) as usize] as u16;
        let hi = state.registers[led_off_h_reg(channel) as usize] as u16;
        (hi << 8) | lo
    }

    /// 成功的寄存器写入次数
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// 成功的连接次数
    pub fn connect_count(&self) -> u64 {
        self.inner.lock().connects
    }
}

/// 模拟寄存器接口（由 [`MockConnector`] 打开）
#[derive(Debug)]
pub struct MockRegisters {
    chip: MockChip,
}

fn no_device() -> PwmError {
    PwmDeviceError::new(PwmDeviceErrorKind::NoDevice, "mock chip not present").into()
}

impl RegisterIo for MockRegisters {
    fn read_reg(&mut self, reg: u8) -> Result<u8, PwmError> {
        let state = self.chip.inner.lock();
        if !state.present {
            return Err(no_device());
        }
        Ok(state.registers[reg as usize])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), PwmError> {
        let mut state = self.chip.inner.lock();
        if !state.present {
            return Err(no_device());
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(std::io::Error::other("injected write failure").into());
        }
        state.registers[reg as usize] = value;
        state.writes += 1;
        Ok(())
    }
}

/// 模拟连接器
#[derive(Debug, Clone)]
pub struct MockConnector {
    chip: MockChip,
    label: String,
}

impl MockConnector {
    pub fn new(chip: MockChip, label: impl Into<String>) -> Self {
        Self {
            chip,
            label: label.into(),
        }
    }

    pub fn chip(&self) -> &MockChip {
        &self.chip
    }
}

impl Connector for MockConnector {
    type Device = MockRegisters;

    fn connect(&mut self) -> Result<Self::Device, PwmError> {
        let mut state = self.chip.inner.lock();
        if !state.present {
            return Err(no_device());
        }
        state.connects += 1;
        Ok(MockRegisters {
            chip: self.chip.clone(),
        })
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
