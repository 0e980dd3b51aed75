//! 状态命令

use super::Session;
use crate::validation::parse_channels;
use anyhow::Result;
use clap::Args;
use std::thread;

#[derive(Args, Debug)]
pub struct StatusCommand {
    /// 只显示这些通道（默认全部）
    #[arg(long)]
    pub channels: Option<String>,
}

impl StatusCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let servos = session.servos();
        let channels = match &self.channels {
            Some(list) => parse_channels(list, servos.channel_count())?,
            None => (0..servos.channel_count()).collect(),
        };

        // 等调度器完成首次探测
        thread::sleep(servos.tick_interval() * 2);

        println!("Scheduler: {:?}", servos.scheduler_state());
        println!("Tick:      {:?}", servos.tick_interval());
        println!();

        println!("Chips:");
        for chip in 0..servos.chip_count() {
            let state = if servos.is_chip_online(chip) { "online" } else { "offline" };
            println!("  #{}: {}", chip, state);
        }
        println!();

        println!("{:>4}  {:>6}  {:>6}  {:>6}  {:>5}", "ch", "lo", "hi", "pulse", "plan");
        for channel in channels {
            println!(
                "{:>4}  {:>6}  {:>6}  {:>6}  {:>5}",
                channel,
                servos.lo_range(channel)?,
                servos.hi_range(channel)?,
                servos.pulse(channel)?,
                servos.planned_waypoints(channel)?,
            );
        }
        println!();

        let metrics = servos.metrics();
        println!("Metrics:");
        println!("  ticks:            {} ({} overruns)", metrics.ticks, metrics.tick_overruns);
        println!(
            "  pwm writes:       {} ({} errors)",
            metrics.pwm_writes, metrics.pwm_write_errors
        );
        println!("  skipped offline:  {}", metrics.writes_skipped_offline);
        println!("  chip connects:    {}", metrics.chip_connects);
        println!(
            "  barriers:         {} completed, {} forced",
            metrics.barriers_completed, metrics.barriers_forced
        );

        if !session.mock_chips().is_empty() {
            println!("  (mock chips)");
        }
        Ok(())
    }
}
