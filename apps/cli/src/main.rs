//! # Rabbit Servo CLI
//!
//! 舵机通道调试与标定工具。
//!
//! ```bash
//! # 通道 0 以 500ms 移动到 1500µs，保持直到 Ctrl-C
//! rabbit-servo-cli set 0 1500 --ms 500
//!
//! # 探测机械极限（忽略标定范围）
//! rabbit-servo-cli set 4 380 --ignore-range
//!
//! # 头部哨兵扫描
//! rabbit-servo-cli --config servos.toml sweep 12
//!
//! # 无硬件调试
//! rabbit-servo-cli --mock status
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod validation;

use commands::{CenterCommand, PercentCommand, SetCommand, Session, StatusCommand, SweepCommand};

/// Rabbit Servo CLI - 舵机通道命令行工具
#[derive(Parser, Debug)]
#[command(name = "rabbit-servo-cli")]
#[command(about = "Drive and calibrate servo channels", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（TOML），不指定时使用默认配置
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 使用模拟芯片（无需硬件）
    #[arg(long, global = true)]
    mock: bool,

    /// 动作完成后立即退出（默认保持输出直到 Ctrl-C）
    #[arg(long, global = true)]
    once: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 设置脉宽（µs）
    Set {
        #[command(flatten)]
        args: SetCommand,
    },

    /// 按百分比设置（0 = 下限，100 = 上限）
    Percent {
        #[command(flatten)]
        args: PercentCommand,
    },

    /// 居中
    Center {
        #[command(flatten)]
        args: CenterCommand,
    },

    /// 哨兵扫描：中 → 上限 → 下限 → 中，循环直到 Ctrl-C
    Sweep {
        #[command(flatten)]
        args: SweepCommand,
    },

    /// 查看通道和芯片状态
    Status {
        #[command(flatten)]
        args: StatusCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rabbit_servo=info".parse()?)
                .add_directive("rabbit_servo_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let session = Session::open(cli.config.as_deref(), cli.mock, cli.once)?;

    match cli.command {
        Commands::Set { args } => args.execute(&session),
        Commands::Percent { args } => args.execute(&session),
        Commands::Center { args } => args.execute(&session),
        Commands::Sweep { args } => args.execute(&session),
        Commands::Status { args } => args.execute(&session),
    }?;

    session.close()
}
