//! 命令模块
//!
//! 所有命令共享一个 [`Session`]：启动调度器、安装 Ctrl-C 处理、等待运动完成。

pub mod pulse;
pub mod status;
pub mod sweep;

pub use pulse::{CenterCommand, PercentCommand, SetCommand};
pub use status::StatusCommand;
pub use sweep::SweepCommand;

use anyhow::{Context, Result};
use rabbit_pwm::MockChip;
use rabbit_servo::{
    ChannelMask, PlanMode, ServoError, Servos, ServosBuilder, SyncOutcome, Waypoint,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Ctrl-C 检查间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 一次命令行会话
pub struct Session {
    servos: Servos,
    interrupted: Arc<AtomicBool>,
    once: bool,
    mock_chips: Vec<MockChip>,
}

impl Session {
    /// 启动调度器
    pub fn open(config: Option<&Path>, mock: bool, once: bool) -> Result<Self> {
        let mut builder = ServosBuilder::new();
        if let Some(path) = config {
            builder = builder
                .config_file(path)
                .with_context(|| format!("加载配置文件失败: {}", path.display()))?;
        }

        let mut mock_chips = Vec::new();
        if mock {
            mock_chips = builder
                .config_ref()
                .chip_addresses
                .iter()
                .map(|_| MockChip::new())
                .collect();
            builder = builder.mock(mock_chips.clone());
        }

        let servos = builder.build().context("启动舵机调度器失败")?;

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("安装 Ctrl-C 处理失败")?;

        Ok(Self {
            servos,
            interrupted,
            once,
            mock_chips,
        })
    }

    pub fn servos(&self) -> &Servos {
        &self.servos
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// 模拟芯片（非 `--mock` 时为空）
    pub fn mock_chips(&self) -> &[MockChip] {
        &self.mock_chips
    }

    /// 等待通道执行完运动计划，Ctrl-C 可打断
    ///
    /// 返回 `true` 表示运动完成。
    pub fn wait_motion(&self, mask: ChannelMask) -> Result<bool> {
        loop {
            if self.interrupted() {
                return Ok(false);
            }
            match self.servos.sync_channels_timeout(mask, POLL_INTERVAL) {
                Ok(SyncOutcome::Completed) => return Ok(true),
                Ok(SyncOutcome::ShutDown) => return Ok(false),
                Err(ServoError::Timeout) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 把通道移动到目标脉宽
    ///
    /// `ms` 为 `None` 时立即设置，否则以插值方式在 `ms` 毫秒内到达并等待完成。
    pub fn move_channels(
        &self,
        channels: &[usize],
        ms: Option<u64>,
        target_of: impl Fn(&Servos, usize) -> Result<u32>,
    ) -> Result<()> {
        let servos = &self.servos;
        match ms {
            None => {
                for &channel in channels {
                    let pulse = target_of(servos, channel)?;
                    servos.set_pulse(channel, pulse)?;
                }
            },
            Some(ms) => {
                for &channel in channels {
                    let pulse = target_of(servos, channel)?;
                    servos.schedule_plan(
                        channel,
                        &[Waypoint::from_millis(pulse, ms)],
                        PlanMode::Replace,
                    )?;
                }
                self.wait_motion(ChannelMask::from_channels(channels.iter().copied()))?;
            },
        }

        for &channel in channels {
            println!("channel {:>2}: {} µs", channel, servos.pulse(channel)?);
        }
        Ok(())
    }

    /// 保持输出直到 Ctrl-C（`--once` 时直接返回）
    ///
    /// 退出时芯片会进入休眠，舵机失去保持力矩。
    pub fn hold(&self) {
        if self.once || self.interrupted() {
            return;
        }
        info!("Holding outputs, press Ctrl-C to exit");
        while !self.interrupted() {
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// 关闭调度器（等待芯片休眠）
    pub fn close(self) -> Result<()> {
        self.servos
            .shutdown_and_wait()
            .context("关闭舵机调度器失败")
    }
}
