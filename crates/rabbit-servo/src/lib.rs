//! # Rabbit Servo
//!
//! 舵机通道调度层，负责把上层的运动意图（"肩关节转到 40°"、"头部哨兵扫描"）
//! 转换为平滑、限时、硬件安全的脉宽序列：
//! - 通道标定（每个通道独立的脉宽上下限）
//! - 路点运动计划与固定周期线性插值
//! - 跨通道同步屏障（等待一组通道全部到位）
//! - 芯片掉线容错（运动在逻辑上继续，芯片重新上线后补写当前值）
//!
//! # 线程模型
//!
//! 调用者可以从任意线程并发调用 [`Servos`] 的方法；单个调度线程独占 PWM 总线，
//! 所有共享状态由一把锁保护，总线 I/O 在锁外进行。

mod builder;
mod bus;
mod channel;
pub mod config;
mod error;
pub mod metrics;
pub mod plan;
mod scheduler;
mod servos;
pub mod state;
pub mod sync;

pub use builder::ServosBuilder;
pub use config::{ChannelConfig, RangeConfig, ServoConfig};
pub use error::ServoError;
pub use metrics::{MetricsSnapshot, ServoMetrics};
pub use plan::{PlanMode, Waypoint};
pub use servos::{PulseOptions, Servos};
pub use state::{AtomicSchedulerState, SchedulerState};
pub use sync::{ChannelMask, SyncOutcome};
