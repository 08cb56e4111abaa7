//! 监控核心模块
//!
//! 包含存活状态机、可用率统计、监控周期编排和调度器

pub mod clock;
pub mod cycle;
pub mod liveness;
pub mod scheduler;
pub mod uptime;

// 重新导出主要类型
pub use clock::{ChannelTicker, Clock, IntervalTicker, ManualClock, SystemClock, Ticker};
pub use cycle::{AlertDelivery, MonitorCycle, TargetReport, TickReport};
pub use liveness::{evaluate, is_probe_success, LivenessState, Transition};
pub use scheduler::{MonitorScheduler, Scheduler, SchedulerStatus};
pub use uptime::{is_available_check, DashboardStats, TargetUptime, UptimeAggregator, UptimeReport};
