//! 调度线程
//!
//! 固定周期推进所有通道的运动计划，把变化的脉宽写入 PWM 总线，并在每个周期末尾
//! 释放已经满足条件的同步屏障。
//!
//! # 周期
//!
//! ```text
//!  ┌──────────────┐   ┌──────────────────────┐   ┌─────────────┐   ┌─────────────────┐
//!  │ 探测离线芯片   │──▶│ lock: 推进计划/收集写入 │──▶│ 总线写入(无锁) │──▶│ lock: 记录/屏障   │
//!  └──────────────┘   └──────────────────────┘   └─────────────┘   └─────────────────┘
//! ```
//!
//! 两个周期之间线程在 `Condvar` 上等待绝对截止时间。可以被提前唤醒：
//! - 立即写入请求（`set_pulse` 等）：只写入脏通道，不推进计划
//! - 关闭请求：立即强制释放屏障并重新评估状态

use crate::bus::PwmBus;
use crate::channel::ChannelTable;
use crate::metrics::ServoMetrics;
use crate::plan::MotionPlan;
use crate::state::{AtomicSchedulerState, SchedulerState};
use crate::sync::{BarrierRegistry, SyncOutcome};
use parking_lot::{Condvar, Mutex};
use rabbit_pwm::{Connector, PwmChip, PwmError};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 一个周期内的写入批次（通道号, 脉宽）
type WriteBatch = SmallVec<[(usize, u32); 32]>;

/// 由单把锁保护的调度状态
pub(crate) struct Core {
    pub channels: ChannelTable,
    pub plans: Vec<MotionPlan>,
    pub barriers: BarrierRegistry,
    /// 有脏通道等待立即写入
    pub flush_requested: bool,
    pub shutdown_requested: bool,
}

impl Core {
    pub fn new(channels: ChannelTable) -> Self {
        let plans = (0..channels.len()).map(|_| MotionPlan::new()).collect();
        Self {
            channels,
            plans,
            barriers: BarrierRegistry::new(),
            flush_requested: false,
            shutdown_requested: false,
        }
    }

    /// 通道没有运动计划（越界通道视为空闲）
    #[inline]
    pub fn is_idle(&self, channel: usize) -> bool {
        self.plans.get(channel).is_none_or(MotionPlan::is_empty)
    }

    pub fn all_idle(&self) -> bool {
        self.plans.iter().all(MotionPlan::is_empty)
    }

    /// 推进所有非空计划一个周期
    fn advance_plans(&mut self) {
        for (index, plan) in self.plans.iter_mut().enumerate() {
            if plan.is_empty() {
                continue;
            }
            let Ok(channel) = self.channels.get_mut(index) else {
                continue;
            };
            if let Some(pulse) = plan.tick(channel.lo, channel.hi) {
                channel.pulse = pulse;
                channel.driven = true;
            }
        }
    }

    fn collect_stale(&self) -> WriteBatch {
        self.channels
            .iter()
            .filter(|(_, channel)| channel.is_stale())
            .map(|(index, channel)| (index, channel.pulse))
            .collect()
    }

    fn clear_all_plans(&mut self) -> usize {
        let mut cleared = 0;
        for plan in &mut self.plans {
            if !plan.is_empty() {
                plan.clear();
                cleared += 1;
            }
        }
        cleared
    }
}

/// 调用线程和调度线程共享的上下文
pub(crate) struct Shared {
    pub core: Mutex<Core>,
    /// 唤醒调度线程
    pub wake: Condvar,
    pub state: AtomicSchedulerState,
    pub metrics: ServoMetrics,
    /// 芯片在线状态（调度线程每个周期发布）
    pub chip_online: Vec<AtomicBool>,
    pub tick: Duration,
    pub drain_timeout: Duration,
}

impl Shared {
    pub fn new(core: Core, chip_count: usize, tick: Duration, drain_timeout: Duration) -> Self {
        Self {
            core: Mutex::new(core),
            wake: Condvar::new(),
            state: AtomicSchedulerState::new(SchedulerState::Running),
            metrics: ServoMetrics::new(),
            chip_online: (0..chip_count).map(|_| AtomicBool::new(false)).collect(),
            tick,
            drain_timeout,
        }
    }

    /// 请求立即写入（调用者已持有锁）
    pub fn request_flush(&self, core: &mut Core) {
        core.flush_requested = true;
        self.wake.notify_one();
    }

    /// 请求关闭（非阻塞）
    pub fn request_shutdown(&self) {
        let mut core = self.core.lock();
        if !core.shutdown_requested {
            core.shutdown_requested = true;
            info!("Servo scheduler shutdown requested");
        }
        self.wake.notify_one();
    }
}

/// 唤醒原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeReason {
    Tick,
    Flush,
    Shutdown,
}

/// 线程退出时（包括 panic）强制释放所有屏障，保证不会有调用者永久阻塞
struct ExitGuard<'a> {
    shared: &'a Shared,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut core = self.shared.core.lock();
        core.shutdown_requested = true;
        let forced = core.barriers.release_all(SyncOutcome::ShutDown);
        ServoMetrics::add(&self.shared.metrics.barriers_forced, forced);
        self.shared.state.set(SchedulerState::Stopped);
        for online in &self.shared.chip_online {
            online.store(false, Ordering::Release);
        }
        if std::thread::panicking() {
            tracing::error!(
                "Servo scheduler panicked, {} barrier(s) force-released",
                forced
            );
        } else if forced > 0 {
            debug!("{} barrier(s) force-released on exit", forced);
        }
    }
}

/// 调度线程主循环
///
/// # 参数
/// - `bus`: PWM 总线（由本线程独占）
/// - `shared`: 共享上下文
pub(crate) fn scheduler_loop<C>(mut bus: PwmBus<C>, shared: Arc<Shared>)
where
    C: Connector,
    C::Device: PwmChip,
{
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Servo scheduler priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set servo scheduler priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let guard = ExitGuard { shared: &shared };
    info!(
        "Servo scheduler started: {} chip(s), {} channel(s), tick {:?}",
        bus.chip_count(),
        bus.channel_count(),
        shared.tick
    );

    let tick = shared.tick;
    // 第一个周期立即执行：探测芯片并写入启动时居中的通道
    let mut next_tick = Instant::now();
    let mut shutdown_seen = false;
    let mut drain_deadline: Option<Instant> = None;

    loop {
        match wait_for_work(&shared, next_tick, shutdown_seen) {
            WakeReason::Tick => {
                next_tick += tick;
                let now = Instant::now();
                if next_tick <= now {
                    // 处理时间超过了一个周期：从当前时间重新对齐，不补跑错过的周期
                    shared.metrics.tick_overruns.fetch_add(1, Ordering::Relaxed);
                    trace!("Servo tick overrun by {:?}", now - next_tick);
                    next_tick = now + tick;
                }
                run_cycle(&mut bus, &shared, true);
                shared.metrics.ticks.fetch_add(1, Ordering::Relaxed);
            },
            WakeReason::Flush => run_cycle(&mut bus, &shared, false),
            WakeReason::Shutdown => {
                shutdown_seen = true;
                {
                    let mut core = shared.core.lock();
                    let forced = core.barriers.release_all(SyncOutcome::ShutDown);
                    ServoMetrics::add(&shared.metrics.barriers_forced, forced);
                    if forced > 0 {
                        debug!("{} barrier(s) released on shutdown", forced);
                    }
                }
                // 关闭请求和立即写入可能同时到达，先把已经提交的脉宽写出去
                run_cycle(&mut bus, &shared, false);
            },
        }

        if shutdown_seen && evaluate_shutdown(&shared, &mut drain_deadline) {
            break;
        }
    }

    bus.shutdown();
    drop(guard);
    info!("Servo scheduler stopped");
}

/// 等待下一个周期，或被提前唤醒
fn wait_for_work(shared: &Shared, deadline: Instant, shutdown_seen: bool) -> WakeReason {
    let mut core = shared.core.lock();
    loop {
        if core.shutdown_requested && !shutdown_seen {
            return WakeReason::Shutdown;
        }
        if core.flush_requested {
            return WakeReason::Flush;
        }
        if Instant::now() >= deadline {
            return WakeReason::Tick;
        }
        shared.wake.wait_until(&mut core, deadline);
    }
}

/// 关闭请求之后的状态转换，返回是否应该退出
///
/// `Stopped` 由退出守卫在芯片休眠之后发布。
fn evaluate_shutdown(shared: &Shared, drain_deadline: &mut Option<Instant>) -> bool {
    let mut core = shared.core.lock();
    if core.all_idle() {
        return true;
    }

    let now = Instant::now();
    match *drain_deadline {
        None => {
            *drain_deadline = Some(now + shared.drain_timeout);
            shared.state.set(SchedulerState::Draining);
            info!(
                "Servo scheduler draining (timeout {:?})",
                shared.drain_timeout
            );
            false
        },
        Some(deadline) if now >= deadline => {
            let cleared = core.clear_all_plans();
            warn!(
                "Drain timeout after {:?}, dropped motion plans on {} channel(s)",
                shared.drain_timeout, cleared
            );
            true
        },
        Some(_) => false,
    }
}

/// 执行一个周期
///
/// `advance` 为 false 时只写入脏通道（立即写入请求），不探测芯片也不推进计划。
fn run_cycle<C>(bus: &mut PwmBus<C>, shared: &Shared, advance: bool)
where
    C: Connector,
    C::Device: PwmChip,
{
    let metrics = &shared.metrics;

    // 1. 探测离线芯片（无锁）
    let reconnected = if advance {
        bus.probe_all()
    } else {
        Default::default()
    };
    ServoMetrics::add(&metrics.chip_connects, reconnected.len());

    // 2. 推进计划，收集需要写入的通道
    let batch = {
        let mut core = shared.core.lock();
        core.flush_requested = false;
        for &chip in &reconnected {
            // 重新上线的芯片寄存器状态未知，所有已驱动的通道都要重写
            core.channels.invalidate_written(bus.channel_range(chip));
        }
        if advance {
            core.advance_plans();
        }
        core.collect_stale()
    };

    // 3. 总线写入（无锁）
    let mut written = WriteBatch::new();
    let mut skipped = 0;
    for &(channel, pulse) in &batch {
        match bus.write_pulse(channel, pulse) {
            Ok(()) => written.push((channel, pulse)),
            Err(PwmError::Offline) => skipped += 1,
            Err(e) => {
                metrics.pwm_write_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Write to channel {} failed: {}", channel, e);
            },
        }
    }
    ServoMetrics::add(&metrics.pwm_writes, written.len());
    ServoMetrics::add(&metrics.writes_skipped_offline, skipped);

    for (chip, online) in shared.chip_online.iter().enumerate() {
        online.store(bus.is_online(chip), Ordering::Release);
    }

    // 4. 记录硬件值，评估屏障
    let mut core = shared.core.lock();
    for (channel, pulse) in written {
        if let Ok(entry) = core.channels.get_mut(channel) {
            entry.written = Some(pulse);
        }
    }
    let Core {
        plans, barriers, ..
    } = &mut *core;
    let released =
        barriers.release_idle(|channel| plans.get(channel).is_none_or(MotionPlan::is_empty));
    if released > 0 {
        ServoMetrics::add(&metrics.barriers_completed, released);
        trace!(
            "{} barrier(s) released, {} still waiting",
            released,
            barriers.len()
        );
    }
}
