//! 运动计划与插值
//!
//! 每个通道有一个路点队列：队首正在执行，其余等待。
//!
//! # 算法
//!
//! 路点入队时计算：
//!
//! ```text
//! intervals = floor(duration / tick) + 1
//! step      = (target - start) / intervals
//! ```
//!
//! 每个调度周期推进队首：累加 `step`，向上取整并截断到标定范围；
//! 第 `intervals` 个周期直接落到目标值（消除累积的舍入误差）并出队。
//! 下一个路点从下一个周期开始执行。

use std::collections::VecDeque;
use std::time::Duration;

/// 路点：目标脉宽和到达所需时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waypoint {
    /// 目标脉宽（µs）
    pub pulse: u32,
    /// 运动时长
    pub duration: Duration,
}

impl Waypoint {
    pub fn new(pulse: u32, duration: Duration) -> Self {
        Self { pulse, duration }
    }

    pub fn from_millis(pulse: u32, ms: u64) -> Self {
        Self::new(pulse, Duration::from_millis(ms))
    }
}

/// 计划写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanMode {
    /// 替换整个队列（取消正在进行的运动）
    #[default]
    Replace,
    /// 追加到队尾，从上一个路点的目标值继续
    Append,
}

/// 单个路点的执行状态
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExecutionState {
    /// 截断后的目标脉宽
    target: u32,
    intervals: u32,
    elapsed_intervals: u32,
    step: f64,
    current: f64,
}

impl ExecutionState {
    fn new(target: u32, duration: Duration, start: u32, tick: Duration) -> Self {
        let tick_ms = tick.as_millis().max(1);
        let intervals = (duration.as_millis() / tick_ms)
            .saturating_add(1)
            .min(u32::MAX as u128) as u32;
        Self {
            target,
            intervals,
            elapsed_intervals: 0,
            step: (target as f64 - start as f64) / intervals as f64,
            current: start as f64,
        }
    }

    /// 推进一个周期，返回 `(脉宽, 是否完成)`
    fn advance(&mut self, lo: u32, hi: u32) -> (u32, bool) {
        self.elapsed_intervals += 1;
        self.current += self.step;

        if self.elapsed_intervals >= self.intervals {
            return (self.target.clamp(lo, hi), true);
        }

        let pulse = self.current.ceil().max(0.0) as u32;
        (pulse.clamp(lo, hi), false)
    }

    pub fn target(&self) -> u32 {
        self.target
    }
}

/// 单个通道的运动计划
#[derive(Debug, Default)]
pub(crate) struct MotionPlan {
    queue: VecDeque<ExecutionState>,
}

impl MotionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入路点
    ///
    /// 起点：队列为空时为 `current`，否则为队尾路点的目标。
    /// `current` 会先截断到标定范围：用 `ignore_range` 探测过极限的通道，
    /// 第一个周期就回到范围内，而不是从范围外开始插值。
    /// 空路点列表不做任何修改。
    pub fn schedule(
        &mut self,
        waypoints: &[Waypoint],
        mode: PlanMode,
        current: u32,
        lo: u32,
        hi: u32,
        tick: Duration,
    ) {
        if waypoints.is_empty() {
            return;
        }

        if mode == PlanMode::Replace {
            self.queue.clear();
        }

        let mut start = match self.queue.back() {
            Some(last) => last.target,
            None => current.clamp(lo, hi),
        };

        for waypoint in waypoints {
            let target = waypoint.pulse.clamp(lo, hi);
            self.queue
                .push_back(ExecutionState::new(target, waypoint.duration, start, tick));
            start = target;
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// 队尾路点的目标
    pub fn last_target(&self) -> Option<u32> {
        self.queue.back().map(ExecutionState::target)
    }

    /// 推进队首路点一个周期，返回新的脉宽（队列为空时返回 `None`）
    pub fn tick(&mut self, lo: u32, hi: u32) -> Option<u32> {
        let head = self.queue.front_mut()?;
        let (pulse, finished) = head.advance(lo, hi);
        if finished {
            self.queue.pop_front();
        }
        Some(pulse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(50);

    /// 推进直到队列为空，返回每个周期的脉宽
    fn run_to_end(plan: &mut MotionPlan, lo: u32, hi: u32) -> Vec<u32> {
        let mut pulses = Vec::new();
        while let Some(pulse) = plan.tick(lo, hi) {
            pulses.push(pulse);
            assert!(pulses.len() < 10_000, "plan did not terminate");
        }
        pulses
    }

    #[test]
    fn test_intervals() {
        assert_eq!(ExecutionState::new(2500, Duration::from_millis(500), 500, TICK).intervals, 11);
        assert_eq!(ExecutionState::new(2500, Duration::from_millis(520), 500, TICK).intervals, 11);
        assert_eq!(ExecutionState::new(2500, Duration::from_millis(549), 500, TICK).intervals, 11);
        assert_eq!(ExecutionState::new(2500, Duration::ZERO, 500, TICK).intervals, 1);
    }

    #[test]
    fn test_full_sweep_converges_in_eleven_ticks() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(2500, 500)],
            PlanMode::Replace,
            500,
            500,
            2500,
            TICK,
        );

        let pulses = run_to_end(&mut plan, 500, 2500);
        assert_eq!(pulses.len(), 11);
        assert_eq!(*pulses.last().unwrap(), 2500);
        // 单调递增，步长约 181.8
        assert!(pulses.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(pulses[0], 682);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_decreasing_motion_rounds_up_and_snaps() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(1000, 100)],
            PlanMode::Replace,
            1001,
            500,
            2500,
            TICK,
        );
        // 3 个周期，每次 -1/3：ceil(1000.67)=1001, ceil(1000.33)=1001, 然后直接落到 1000
        assert_eq!(run_to_end(&mut plan, 500, 2500), vec![1001, 1001, 1000]);
    }

    #[test]
    fn test_zero_duration_jumps_next_tick() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(2000, 0)],
            PlanMode::Replace,
            1000,
            500,
            2500,
            TICK,
        );
        assert_eq!(run_to_end(&mut plan, 500, 2500), vec![2000]);
    }

    #[test]
    fn test_targets_clamped() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(9000, 50), Waypoint::from_millis(0, 50)],
            PlanMode::Replace,
            1500,
            500,
            2500,
            TICK,
        );
        assert_eq!(plan.last_target(), Some(500));
        let pulses = run_to_end(&mut plan, 500, 2500);
        assert!(pulses.iter().all(|&p| (500..=2500).contains(&p)));
        assert_eq!(pulses[1], 2500);
        assert_eq!(*pulses.last().unwrap(), 500);
    }

    #[test]
    fn test_start_from_unclamped_current() {
        // 从未驱动（脉宽 0）的通道从下限开始插值
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(600, 50)],
            PlanMode::Replace,
            0,
            500,
            2500,
            TICK,
        );
        assert_eq!(run_to_end(&mut plan, 500, 2500), vec![550, 600]);
    }

    #[test]
    fn test_chaining_starts_from_last_target() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(2000, 50)],
            PlanMode::Replace,
            1000,
            500,
            2500,
            TICK,
        );
        plan.schedule(
            &[Waypoint::from_millis(1000, 50)],
            PlanMode::Append,
            // 当前值被忽略：起点是队尾目标 2000
            1000,
            500,
            2500,
            TICK,
        );
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.last_target(), Some(1000));

        let pulses = run_to_end(&mut plan, 500, 2500);
        assert_eq!(pulses, vec![1500, 2000, 1500, 1000]);
    }

    #[test]
    fn test_next_waypoint_waits_one_tick() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(1100, 0), Waypoint::from_millis(1200, 0)],
            PlanMode::Replace,
            1000,
            500,
            2500,
            TICK,
        );
        assert_eq!(plan.tick(500, 2500), Some(1100));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.tick(500, 2500), Some(1200));
        assert_eq!(plan.tick(500, 2500), None);
    }

    #[test]
    fn test_replace_cancels_and_empty_is_noop() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(2000, 1000)],
            PlanMode::Replace,
            1000,
            500,
            2500,
            TICK,
        );
        plan.tick(500, 2500);

        // 空路点列表：保留原计划
        plan.schedule(&[], PlanMode::Replace, 1000, 500, 2500, TICK);
        assert_eq!(plan.len(), 1);

        plan.schedule(
            &[Waypoint::from_millis(700, 0)],
            PlanMode::Replace,
            1050,
            500,
            2500,
            TICK,
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.last_target(), Some(700));

        plan.clear();
        plan.clear();
        assert!(plan.is_empty());
        assert_eq!(plan.last_target(), None);
        assert_eq!(plan.tick(500, 2500), None);
    }

    #[test]
    fn test_tick_clamps_to_narrowed_range() {
        let mut plan = MotionPlan::new();
        plan.schedule(
            &[Waypoint::from_millis(2500, 500)],
            PlanMode::Replace,
            500,
            500,
            2500,
            TICK,
        );
        // 执行过程中范围被收窄
        let pulses = run_to_end(&mut plan, 500, 1000);
        assert_eq!(pulses.len(), 11);
        assert!(pulses.iter().all(|&p| p <= 1000));
        assert_eq!(*pulses.last().unwrap(), 1000);
    }
}
