//! 哨兵扫描命令
//!
//! 中 → 上限 → 下限 → 中，循环直到 Ctrl-C 或达到次数。

use super::Session;
use crate::validation::{parse_channels, validate_speed};
use anyhow::Result;
use clap::Args;
use rabbit_servo::{ChannelMask, PlanMode, Servos, Waypoint};
use tracing::info;

/// 一个扫描循环的各段（目标，基准时长 ms）
#[derive(Debug, Clone, Copy)]
enum Leg {
    Center(u64),
    High(u64),
    Low(u64),
}

const CYCLE: [Leg; 4] = [Leg::Center(50), Leg::High(5000), Leg::Low(10000), Leg::Center(5000)];

#[derive(Args, Debug)]
pub struct SweepCommand {
    /// 通道列表
    pub channels: String,

    /// 循环次数（0 = 直到 Ctrl-C）
    #[arg(long, default_value_t = 0)]
    pub cycles: u32,

    /// 速度倍率（2.0 = 两倍速）
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
}

impl SweepCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let servos = session.servos();
        let channels = parse_channels(&self.channels, servos.channel_count())?;
        let speed = validate_speed(self.speed)?;
        let mask = ChannelMask::from_channels(channels.iter().copied());

        info!("Sweeping channels {:?}, press Ctrl-C to stop", channels);

        let mut completed = 0u32;
        'sweep: while self.cycles == 0 || completed < self.cycles {
            for leg in CYCLE {
                for &channel in &channels {
                    let next = waypoint(servos, channel, leg, speed)?;
                    servos.schedule_plan(channel, &[next], PlanMode::Append)?;
                }
                if !session.wait_motion(mask)? {
                    break 'sweep;
                }
            }
            completed += 1;
            println!("cycle {} done", completed);
        }

        // 结束或中断后回中
        for &channel in &channels {
            servos.center(channel)?;
        }
        Ok(())
    }
}

fn waypoint(servos: &Servos, channel: usize, leg: Leg, speed: f64) -> Result<Waypoint> {
    let lo = servos.lo_range(channel)?;
    let hi = servos.hi_range(channel)?;
    let (pulse, ms) = match leg {
        Leg::Center(ms) => (lo + (hi - lo) / 2, ms),
        Leg::High(ms) => (hi, ms),
        Leg::Low(ms) => (lo, ms),
    };
    Ok(Waypoint::from_millis(pulse, (ms as f64 / speed).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_shape() {
        let total: u64 = CYCLE
            .iter()
            .map(|leg| match *leg {
                Leg::Center(ms) | Leg::High(ms) | Leg::Low(ms) => ms,
            })
            .sum();
        assert_eq!(total, 20050);
        assert!(matches!(CYCLE[0], Leg::Center(_)));
        assert!(matches!(CYCLE[3], Leg::Center(_)));
    }
}
