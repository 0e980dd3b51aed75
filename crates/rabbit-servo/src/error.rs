//! 舵机调度层错误类型定义

use thiserror::Error;

/// 舵机调度层错误类型
#[derive(Error, Debug)]
pub enum ServoError {
    /// 通道号越界
    #[error("Invalid channel {channel} (channel count: {count})")]
    InvalidChannel { channel: usize, count: usize },

    /// 标定范围无效（要求 lo < hi）
    #[error("Invalid range for channel {channel}: lo {lo} >= hi {hi}")]
    InvalidRange { channel: usize, lo: u32, hi: u32 },

    /// 同步掩码包含不存在的通道
    #[error("Invalid channel mask {mask:#x} (channel count: {count})")]
    InvalidMask { mask: u64, count: usize },

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),

    /// 配置文件读取错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件解析错误
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// 调度线程错误
    #[error("Scheduler thread error: {0}")]
    SchedulerThread(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 当前平台不支持
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
