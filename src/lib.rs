//! PingBot - HTTP(S) 端点存活监控引擎
//!
//! 这是一个用Rust编写的存活监控工具，支持：
//! - 周期性 HEAD 探测，周期之间互不重叠
//! - 基于状态转换的宕机邮件告警（只在进入宕机时发送一次）
//! - 滑动窗口可用率统计与仪表盘汇总
//! - JSON 快照持久化与结构化日志记录

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod probe;
pub mod store;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, TargetConfig};
pub use error::PingBotError;
pub use monitor::{LivenessState, MonitorCycle, Transition, UptimeReport};
pub use probe::ProbeOutcome;

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
