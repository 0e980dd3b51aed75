//! 设备生命周期管理
//!
//! 所有挂在总线上的设备都遵循同一个模式：
//!
//! ```text
//!   ┌─────────┐  connect() ok   ┌────────┐
//!   │ Offline │ ──────────────▶ │ Online │
//!   └─────────┘ ◀────────────── └────────┘
//!        ▲        I/O error          │
//!        └── 下个周期 probe() 重试 ───┘
//! ```
//!
//! `DeviceSlot` 把这个模式实现一次：周期性 `probe()` 打开离线设备，
//! `with_device()` 中任何 I/O 错误都会关闭句柄并把设备标记为离线。

use crate::{Connector, PwmError};
use tracing::{debug, error, info, warn};

/// `probe()` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 设备原本就在线
    Online,
    /// 设备刚刚（重新）上线
    Connected,
    /// 设备仍然离线
    Offline,
}

/// 设备槽位
pub struct DeviceSlot<C: Connector> {
    connector: C,
    device: Option<C::Device>,
    label: String,
    /// 连续连接失败次数（用于日志降噪）
    failed_attempts: u64,
}

impl<C: Connector> DeviceSlot<C> {
    /// 创建槽位（不会立即打开设备）
    pub fn new(connector: C) -> Self {
        let label = connector.label();
        Self {
            connector,
            device: None,
            label,
            failed_attempts: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_online(&self) -> bool {
        self.device.is_some()
    }

    /// 如果设备离线，尝试打开
    pub fn probe(&mut self) -> ProbeOutcome {
        if self.device.is_some() {
            return ProbeOutcome::Online;
        }

        match self.connector.connect() {
            Ok(device) => {
                info!("{} is online", self.label);
                self.device = Some(device);
                self.failed_attempts = 0;
                ProbeOutcome::Connected
            },
            Err(e) => {
                // 第一次失败用 warn（总线缺失或无权限用 error），之后每个周期都会重试，降为 debug
                if self.failed_attempts == 0 {
                    if e.is_fatal() {
                        error!("{} unavailable, check the bus and permissions: {}", self.label, e);
                    } else {
                        warn!("{} is offline: {}", self.label, e);
                    }
                } else {
                    debug!(
                        "{} still offline ({} attempts): {}",
                        self.label, self.failed_attempts, e
                    );
                }
                self.failed_attempts += 1;
                ProbeOutcome::Offline
            },
        }
    }

    /// 在设备上执行操作
    ///
    /// 设备离线时返回 `PwmError::Offline`，不做任何 I/O。
    /// 操作失败时关闭设备句柄，等待下一次 `probe()` 重连；
    /// 参数错误（如通道越界）不涉及硬件，设备保持在线。
    pub fn with_device<T>(
        &mut self,
        op: impl FnOnce(&mut C::Device) -> Result<T, PwmError>,
    ) -> Result<T, PwmError> {
        let device = self.device.as_mut().ok_or(PwmError::Offline)?;
        match op(device) {
            Ok(value) => Ok(value),
            Err(e) if e.is_caller_error() => Err(e),
            Err(e) => {
                warn!("{} I/O failed, closing: {}", self.label, e);
                self.device = None;
                Err(e)
            },
        }
    }

    /// 关闭设备，返回句柄（调用者可在 drop 前做收尾操作）
    pub fn close(&mut self) -> Option<C::Device> {
        let device = self.device.take();
        if device.is_some() {
            info!("{} is offline", self.label);
        }
        device
    }
}
