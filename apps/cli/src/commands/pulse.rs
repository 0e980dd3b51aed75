//! 脉宽命令：set / percent / center

use super::Session;
use crate::validation::{parse_channels, validate_percent};
use anyhow::Result;
use clap::Args;
use rabbit_servo::PulseOptions;

/// 设置脉宽
#[derive(Args, Debug)]
pub struct SetCommand {
    /// 通道列表，如 `0`、`0,3`、`6-11`、`all`
    pub channels: String,

    /// 脉宽（µs）
    pub pulse: u32,

    /// 运动时长（毫秒），不指定时立即设置
    #[arg(long)]
    pub ms: Option<u64>,

    /// 忽略标定范围（用于探测机械极限）
    #[arg(long)]
    pub ignore_range: bool,
}

impl SetCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let servos = session.servos();
        let channels = parse_channels(&self.channels, servos.channel_count())?;

        if self.ignore_range {
            if self.ms.is_some() {
                anyhow::bail!("--ignore-range 不能与 --ms 同时使用");
            }
            let options = PulseOptions {
                ignore_range: true,
                ..PulseOptions::default()
            };
            for &channel in &channels {
                let applied = servos.set_pulse_with(channel, self.pulse, options)?;
                println!("channel {:>2}: {} µs (range ignored)", channel, applied);
            }
        } else {
            let pulse = self.pulse;
            session.move_channels(&channels, self.ms, |_, _| Ok(pulse))?;
        }

        session.hold();
        Ok(())
    }
}

/// 按百分比设置
#[derive(Args, Debug)]
pub struct PercentCommand {
    /// 通道列表
    pub channels: String,

    /// 百分比（0 = 下限，100 = 上限）
    pub pct: u32,

    /// 运动时长（毫秒）
    #[arg(long)]
    pub ms: Option<u64>,
}

impl PercentCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let servos = session.servos();
        let channels = parse_channels(&self.channels, servos.channel_count())?;
        let pct = validate_percent(self.pct)?;

        session.move_channels(&channels, self.ms, |servos, channel| {
            let lo = servos.lo_range(channel)?;
            let hi = servos.hi_range(channel)?;
            Ok((u64::from(hi - lo) * u64::from(pct) / 100) as u32 + lo)
        })?;

        session.hold();
        Ok(())
    }
}

/// 居中
#[derive(Args, Debug)]
pub struct CenterCommand {
    /// 通道列表
    #[arg(default_value = "all")]
    pub channels: String,

    /// 运动时长（毫秒）
    #[arg(long)]
    pub ms: Option<u64>,
}

impl CenterCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let servos = session.servos();
        let channels = parse_channels(&self.channels, servos.channel_count())?;

        session.move_channels(&channels, self.ms, |servos, channel| {
            let lo = servos.lo_range(channel)?;
            let hi = servos.hi_range(channel)?;
            Ok(lo + (hi - lo) / 2)
        })?;

        session.hold();
        Ok(())
    }
}
