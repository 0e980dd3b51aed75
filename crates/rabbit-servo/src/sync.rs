//! 同步屏障
//!
//! 调用者可以阻塞等待一组通道的运动计划全部执行完毕（如双臂同时到位）。
//!
//! # 协议
//!
//! ```text
//!  调用线程                               调度线程（每个周期末尾）
//!  ────────                               ──────────────────────
//!  lock
//!  register(mask) ──▶ registry
//!  wait(signal)                           lock
//!     ⋮                                   release_idle(): 掩码内通道全部空闲
//!     ⋮                                     → outcome = Completed, notify
//!  wake, outcome(id)                      unlock
//!  remove(id)
//!  unlock
//! ```
//!
//! 每个屏障有独立的 `Condvar`，与共享状态使用同一把锁。
//! 条目只由等待者移除（`remove` 幂等），调度线程只负责写入结果并唤醒。

use parking_lot::Condvar;
use std::fmt;
use std::sync::Arc;

/// 通道位掩码（最多 64 个通道）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelMask(u64);

impl ChannelMask {
    /// 掩码可以表示的最大通道数
    pub const CAPACITY: usize = 64;

    pub const EMPTY: ChannelMask = ChannelMask(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// 从通道列表构造（超出容量的通道会被忽略）
    pub fn from_channels(channels: impl IntoIterator<Item = usize>) -> Self {
        channels
            .into_iter()
            .fold(Self::EMPTY, |mask, channel| mask.with(channel))
    }

    /// 返回加入 `channel` 后的掩码
    #[must_use]
    pub fn with(self, channel: usize) -> Self {
        if channel < Self::CAPACITY {
            Self(self.0 | (1 << channel))
        } else {
            self
        }
    }

    pub fn contains(self, channel: usize) -> bool {
        channel < Self::CAPACITY && self.0 & (1 << channel) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 掩码中的通道（升序）
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..Self::CAPACITY).filter(move |&channel| self.contains(channel))
    }

    /// 掩码是否只包含 `0..count` 内的通道
    pub fn fits(self, count: usize) -> bool {
        count >= Self::CAPACITY || self.0 >> count == 0
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:#x})", self.0)
    }
}

impl From<u64> for ChannelMask {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

/// 屏障等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 掩码内所有通道的运动计划都已完成
    Completed,
    /// 调度器正在关闭，屏障被强制释放（运动可能尚未完成）
    ShutDown,
}

/// 屏障 ID
pub(crate) type BarrierId = u64;

struct BarrierEntry {
    id: BarrierId,
    mask: ChannelMask,
    outcome: Option<SyncOutcome>,
    signal: Arc<Condvar>,
}

/// 屏障注册表（由共享状态的锁保护）
#[derive(Default)]
pub(crate) struct BarrierRegistry {
    entries: Vec<BarrierEntry>,
    next_id: BarrierId,
}

impl BarrierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个屏障，返回 ID 和专属的等待句柄
    pub fn register(&mut self, mask: ChannelMask) -> (BarrierId, Arc<Condvar>) {
        let id = self.next_id;
        self.next_id += 1;
        let signal = Arc::new(Condvar::new());
        self.entries.push(BarrierEntry {
            id,
            mask,
            outcome: None,
            signal: signal.clone(),
        });
        (id, signal)
    }

    /// 屏障结果（尚未释放时为 `None`）
    pub fn outcome(&self, id: BarrierId) -> Option<SyncOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.outcome)
    }

    /// 移除屏障（幂等）
    pub fn remove(&mut self, id: BarrierId) {
        self.entries.retain(|entry| entry.id != id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 释放所有掩码内通道都空闲的屏障，返回本次释放的数量
    pub fn release_idle(&mut self, is_idle: impl Fn(usize) -> bool) -> usize {
        let mut released = 0;
        for entry in self.entries.iter_mut().filter(|e| e.outcome.is_none()) {
            if entry.mask.channels().all(&is_idle) {
                entry.outcome = Some(SyncOutcome::Completed);
                entry.signal.notify_all();
                released += 1;
            }
        }
        released
    }

    /// 强制释放所有尚未释放的屏障，返回本次释放的数量
    pub fn release_all(&mut self, outcome: SyncOutcome) -> usize {
        let mut released = 0;
        for entry in self.entries.iter_mut().filter(|e| e.outcome.is_none()) {
            entry.outcome = Some(outcome);
            entry.signal.notify_all();
            released += 1;
        }
        released
    }
}
