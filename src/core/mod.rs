//! 核心模块
//!
//! 包含应用程序的启动流程、命令分发和服务生命周期管理

pub mod app;
pub mod service;

// 重新导出主要类型
pub use app::execute_command;
pub use service::{SeedSummary, ServiceComponents, ServiceLauncher};
