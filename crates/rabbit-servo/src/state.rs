//! 调度器状态机
//!
//! ```text
//!            shutdown（仍有运动计划）
//!  Running ──────────────────────────▶ Draining
//!     │                                   │
//!     │ shutdown（全部空闲）               │ 全部空闲 / 排空超时
//!     ▼                                   ▼
//!  Stopped ◀──────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SchedulerState {
    /// 正常调度
    #[default]
    Running = 0,

    /// 已请求关闭，等待进行中的运动完成
    ///
    /// 继续按周期推进，让肢体平滑到位而不是停在半路。
    Draining = 1,

    /// 终止
    Stopped = 2,
}

impl SchedulerState {
    /// 从 u8 转换，无效值视为 Stopped
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}

/// 调度器状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicSchedulerState {
    inner: AtomicU8,
}

impl AtomicSchedulerState {
    pub fn new(state: SchedulerState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> SchedulerState {
        SchedulerState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: SchedulerState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }
}

impl Default for AtomicSchedulerState {
    fn default() -> Self {
        Self::new(SchedulerState::Running)
    }
}
