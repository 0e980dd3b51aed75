//! 调度器性能指标
//!
//! 原子计数器，任意线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 调度器实时指标
///
/// # 使用示例
///
/// ```rust
/// use rabbit_servo::ServoMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = ServoMetrics::new();
/// metrics.ticks.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().ticks, 1);
/// ```
#[derive(Debug, Default)]
pub struct ServoMetrics {
    /// 已执行的调度周期数
    pub ticks: AtomicU64,

    /// 周期超时次数（上一周期的处理时间超过了调度周期）
    pub tick_overruns: AtomicU64,

    /// 成功写入硬件的脉宽更新次数
    pub pwm_writes: AtomicU64,

    /// 写入失败次数（芯片随后被标记为离线）
    pub pwm_write_errors: AtomicU64,

    /// 因芯片离线而跳过的写入次数
    pub writes_skipped_offline: AtomicU64,

    /// 芯片（重新）上线次数
    pub chip_connects: AtomicU64,

    /// 正常释放的屏障数
    pub barriers_completed: AtomicU64,

    /// 关闭时被强制释放的屏障数
    pub barriers_forced: AtomicU64,
}

impl ServoMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_overruns: self.tick_overruns.load(Ordering::Relaxed),
            pwm_writes: self.pwm_writes.load(Ordering::Relaxed),
            pwm_write_errors: self.pwm_write_errors.load(Ordering::Relaxed),
            writes_skipped_offline: self.writes_skipped_offline.load(Ordering::Relaxed),
            chip_connects: self.chip_connects.load(Ordering::Relaxed),
            barriers_completed: self.barriers_completed.load(Ordering::Relaxed),
            barriers_forced: self.barriers_forced.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, value: usize) {
        if value > 0 {
            counter.fetch_add(value as u64, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub tick_overruns: u64,
    pub pwm_writes: u64,
    pub pwm_write_errors: u64,
    pub writes_skipped_offline: u64,
    pub chip_connects: u64,
    pub barriers_completed: u64,
    pub barriers_forced: u64,
}
