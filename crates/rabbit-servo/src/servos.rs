//! 舵机调度 API
//!
//! 提供对外的 `Servos` 结构体，封装调度线程和共享状态。
//! 所有方法都可以从任意线程并发调用；除 `sync_channels*` 外都不会阻塞。

use crate::bus::PwmBus;
use crate::channel::{Channel, ChannelTable};
use crate::config::ServoConfig;
use crate::error::ServoError;
use crate::metrics::MetricsSnapshot;
use crate::plan::{PlanMode, Waypoint};
use crate::scheduler::{Core, Shared, scheduler_loop};
use crate::state::SchedulerState;
use crate::sync::{ChannelMask, SyncOutcome};
use rabbit_pwm::{Connector, PwmChip};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // watchdog 线程代为 join，超时后它会随进程退出被回收
        thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 立即写入选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseOptions {
    /// 不截断到标定范围（用于标定时探测机械极限）
    pub ignore_range: bool,
    /// 同时清空该通道的运动计划
    pub clear_plan: bool,
}

impl Default for PulseOptions {
    fn default() -> Self {
        Self {
            ignore_range: false,
            clear_plan: true,
        }
    }
}

/// 舵机调度器
///
/// 持有所有舵机通道，后台线程按固定周期执行运动计划。
/// Drop 时请求关闭并等待调度线程退出（进行中的运动会先执行完，受排空超时限制）。
///
/// # Example
///
/// ```no_run
/// use rabbit_servo::{ChannelMask, PlanMode, ServosBuilder, Waypoint};
///
/// let servos = ServosBuilder::new().build()?;
/// servos.set_range(0, 500, 2500)?;
/// servos.schedule_plan(0, &[Waypoint::from_millis(2500, 500)], PlanMode::Replace)?;
/// servos.sync_channels(ChannelMask::from_channels([0]))?;
/// assert_eq!(servos.pulse(0)?, 2500);
/// # Ok::<(), rabbit_servo::ServoError>(())
/// ```
pub struct Servos {
    shared: Arc<Shared>,
    scheduler_thread: Option<JoinHandle<()>>,
    channels_per_chip: usize,
}

impl Servos {
    /// 使用给定的芯片连接器启动调度器
    ///
    /// 连接器的顺序决定通道编号（第 n 个连接器负责 `n * channels_per_chip ..`）。
    /// 芯片不需要在线：调度线程每个周期都会尝试打开离线芯片。
    pub fn start<C>(config: &ServoConfig, connectors: Vec<C>) -> Result<Self, ServoError>
    where
        C: Connector + Send + 'static,
        C::Device: PwmChip + Send + 'static,
    {
        config.validate()?;
        if connectors.len() != config.chip_addresses.len() {
            return Err(ServoError::Config(format!(
                "{} connector(s) given for {} chip address(es)",
                connectors.len(),
                config.chip_addresses.len()
            )));
        }

        let mut channels = ChannelTable::from_config(config);
        let mut centered = 0;
        for entry in config.channels.iter().filter(|entry| entry.center) {
            let pulse = channels.get(entry.channel)?.center_pulse();
            channels.set_pulse(entry.channel, pulse, false)?;
            centered += 1;
        }

        let mut core = Core::new(channels);
        core.flush_requested = centered > 0;

        let chip_count = connectors.len();
        let shared = Arc::new(Shared::new(
            core,
            chip_count,
            config.tick_interval(),
            config.drain_timeout(),
        ));
        let bus = PwmBus::new(connectors, config.channels_per_chip, config.frequency_hz);

        let thread_shared = shared.clone();
        let scheduler_thread = thread::Builder::new()
            .name("rabbit-servos".into())
            .spawn(move || scheduler_loop(bus, thread_shared))
            .map_err(|e| ServoError::SchedulerThread(e.to_string()))?;

        info!(
            "Servos started: {} channel(s), {} calibrated, {} centered",
            config.channel_count(),
            config.channels.len(),
            centered
        );

        Ok(Self {
            shared,
            scheduler_thread: Some(scheduler_thread),
            channels_per_chip: config.channels_per_chip,
        })
    }

    /// 通道总数
    pub fn channel_count(&self) -> usize {
        self.shared.chip_online.len() * self.channels_per_chip
    }

    pub fn chip_count(&self) -> usize {
        self.shared.chip_online.len()
    }

    /// 调度周期
    pub fn tick_interval(&self) -> Duration {
        self.shared.tick
    }

    /// 设置标定范围（要求 `lo < hi`）
    ///
    /// 已驱动的通道会被截断到新范围内。
    pub fn set_range(&self, channel: usize, lo: u32, hi: u32) -> Result<(), ServoError> {
        let mut core = self.shared.core.lock();
        core.channels.set_range(channel, lo, hi)?;
        if core.channels.get(channel)?.is_stale() {
            self.shared.request_flush(&mut core);
        }
        Ok(())
    }

    /// 标定下限（µs）
    pub fn lo_range(&self, channel: usize) -> Result<u32, ServoError> {
        Ok(self.shared.core.lock().channels.get(channel)?.lo)
    }

    /// 标定上限（µs）
    pub fn hi_range(&self, channel: usize) -> Result<u32, ServoError> {
        Ok(self.shared.core.lock().channels.get(channel)?.hi)
    }

    /// 当前脉宽（µs），从未驱动的通道为 0
    pub fn pulse(&self, channel: usize) -> Result<u32, ServoError> {
        Ok(self.shared.core.lock().channels.get(channel)?.pulse)
    }

    /// 立即设置脉宽（截断到标定范围，并取消该通道的运动计划）
    ///
    /// 返回实际生效的脉宽。硬件写入由调度线程完成。
    pub fn set_pulse(&self, channel: usize, pulse: u32) -> Result<u32, ServoError> {
        self.set_pulse_with(channel, pulse, PulseOptions::default())
    }

    pub fn set_pulse_with(
        &self,
        channel: usize,
        pulse: u32,
        options: PulseOptions,
    ) -> Result<u32, ServoError> {
        let mut core = self.shared.core.lock();
        let pulse = core.channels.set_pulse(channel, pulse, options.ignore_range)?;
        if options.clear_plan {
            core.plans[channel].clear();
        }
        self.shared.request_flush(&mut core);
        Ok(pulse)
    }

    /// 按百分比设置（0 = lo，100 = hi，超过 100 按 100 处理）
    pub fn set_percent(&self, channel: usize, pct: u32) -> Result<u32, ServoError> {
        self.drive(channel, |entry| entry.percent_pulse(pct))
    }

    /// 居中：`(lo + hi) / 2`
    pub fn center(&self, channel: usize) -> Result<u32, ServoError> {
        self.drive(channel, Channel::center_pulse)
    }

    /// 按通道标定计算脉宽并立即写入（取消运动计划）
    fn drive(
        &self,
        channel: usize,
        pulse_of: impl FnOnce(&Channel) -> u32,
    ) -> Result<u32, ServoError> {
        let mut core = self.shared.core.lock();
        let pulse = pulse_of(core.channels.get(channel)?);
        let pulse = core.channels.set_pulse(channel, pulse, false)?;
        core.plans[channel].clear();
        self.shared.request_flush(&mut core);
        Ok(pulse)
    }

    /// 写入运动计划
    ///
    /// 路点目标会被截断到标定范围；空路点列表不做任何修改。
    pub fn schedule_plan(
        &self,
        channel: usize,
        waypoints: &[Waypoint],
        mode: PlanMode,
    ) -> Result<(), ServoError> {
        let tick = self.shared.tick;
        let mut core = self.shared.core.lock();
        let Core {
            channels, plans, ..
        } = &mut *core;
        let entry = channels.get(channel)?;
        plans[channel].schedule(waypoints, mode, entry.pulse, entry.lo, entry.hi, tick);
        Ok(())
    }

    /// 清空运动计划（幂等）
    pub fn clear_plan(&self, channel: usize) -> Result<(), ServoError> {
        let mut core = self.shared.core.lock();
        core.channels.get(channel)?;
        if !core.plans[channel].is_empty() {
            core.plans[channel].clear();
            // 让调度线程尽快评估等待该通道的屏障
            self.shared.request_flush(&mut core);
        }
        Ok(())
    }

    pub fn has_plan(&self, channel: usize) -> Result<bool, ServoError> {
        Ok(self.planned_waypoints(channel)? > 0)
    }

    /// 计划中剩余的路点数（包括正在执行的）
    pub fn planned_waypoints(&self, channel: usize) -> Result<usize, ServoError> {
        let core = self.shared.core.lock();
        core.channels.get(channel)?;
        Ok(core.plans[channel].len())
    }

    /// 最后一个路点的目标；没有计划时为当前脉宽
    pub fn last_planned_pulse(&self, channel: usize) -> Result<u32, ServoError> {
        let core = self.shared.core.lock();
        let pulse = core.channels.get(channel)?.pulse;
        Ok(core.plans[channel].last_target().unwrap_or(pulse))
    }

    /// 阻塞等待掩码内所有通道的运动计划执行完毕
    ///
    /// 空掩码或通道已经空闲时立即返回 `Completed`；已请求关闭时立即返回 `ShutDown`。
    pub fn sync_channels(&self, mask: ChannelMask) -> Result<SyncOutcome, ServoError> {
        self.wait_barrier(mask, None)
    }

    /// 带超时的 [`sync_channels`](Self::sync_channels)，超时返回 `ServoError::Timeout`
    ///
    /// 超时大到无法表示为时间点（如 `Duration::MAX`）时按无限等待处理。
    pub fn sync_channels_timeout(
        &self,
        mask: ChannelMask,
        timeout: Duration,
    ) -> Result<SyncOutcome, ServoError> {
        self.wait_barrier(mask, Instant::now().checked_add(timeout))
    }

    fn wait_barrier(
        &self,
        mask: ChannelMask,
        deadline: Option<Instant>,
    ) -> Result<SyncOutcome, ServoError> {
        let count = self.channel_count();
        if !mask.fits(count) {
            return Err(ServoError::InvalidMask {
                mask: mask.bits(),
                count,
            });
        }

        let mut core = self.shared.core.lock();
        if mask.channels().all(|channel| core.is_idle(channel)) {
            return Ok(SyncOutcome::Completed);
        }
        if core.shutdown_requested {
            return Ok(SyncOutcome::ShutDown);
        }

        let (id, signal) = core.barriers.register(mask);
        loop {
            if let Some(outcome) = core.barriers.outcome(id) {
                core.barriers.remove(id);
                return Ok(outcome);
            }
            match deadline {
                None => signal.wait(&mut core),
                Some(deadline) => {
                    if signal.wait_until(&mut core, deadline).timed_out() {
                        let outcome = core.barriers.outcome(id);
                        core.barriers.remove(id);
                        return outcome.ok_or(ServoError::Timeout);
                    }
                },
            }
        }
    }

    /// 调度器状态
    pub fn scheduler_state(&self) -> SchedulerState {
        self.shared.state.get()
    }

    /// 芯片是否在线（越界芯片返回 false）
    pub fn is_chip_online(&self, chip: usize) -> bool {
        self.shared
            .chip_online
            .get(chip)
            .is_some_and(|online| online.load(Ordering::Acquire))
    }

    /// 指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// 请求关闭（非阻塞）
    ///
    /// 等待中的屏障在一个周期内以 `SyncOutcome::ShutDown` 释放；
    /// 调度线程继续执行剩余的运动计划直到全部完成或排空超时，然后让芯片休眠。
    pub fn shutdown(&self) {
        self.shared.request_shutdown();
    }

    /// 请求关闭并等待调度线程退出
    pub fn shutdown_and_wait(mut self) -> Result<(), ServoError> {
        self.shutdown();
        self.join_scheduler()
    }

    fn join_scheduler(&mut self) -> Result<(), ServoError> {
        let Some(handle) = self.scheduler_thread.take() else {
            return Ok(());
        };
        let timeout = self.shared.drain_timeout + self.shared.tick * 4 + Duration::from_secs(1);
        handle.join_timeout(timeout).map_err(|_| {
            ServoError::SchedulerThread(format!(
                "scheduler thread panicked or failed to stop within {:?}",
                timeout
            ))
        })
    }
}

impl Drop for Servos {
    fn drop(&mut self) {
        self.shutdown();
        if let Err(e) = self.join_scheduler() {
            error!("{}", e);
        }
    }
}
