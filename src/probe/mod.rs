//! 存活探测模块
//!
//! 提供HTTP HEAD探测与探测结果类型

pub mod executor;
pub mod outcome;

// 重新导出主要类型
pub use executor::{HttpProbeExecutor, ProbeExecutor};
pub use outcome::{ProbeOutcome, TransportErrorKind, TRANSPORT_FAILURE_STATUS};
