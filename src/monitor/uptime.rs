//! 可用率统计
//!
//! 从探测日志计算时间窗口内的可用率，以及用户维度的仪表盘汇总

use crate::error::StoreResult;
use crate::monitor::clock::Clock;
use crate::store::{LogStore, ProbeLog, Target, TargetId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 可用率判定的延迟上限（毫秒），达到该值即视为不可用
pub const LATENCY_CEILING_MS: u64 = 30_000;

/// 每次失败检查折算的宕机分钟数
pub const DOWNTIME_MINUTES_PER_FAILED_CHECK: u64 = 30;

/// 默认统计窗口（小时）
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// 可用率统计使用的判定：状态码 `[200, 400)` 且延迟低于 [`LATENCY_CEILING_MS`]
///
/// 与状态机的 [`is_probe_success`](crate::monitor::liveness::is_probe_success) 不同，
/// 这里慢响应会被计为不可用。
pub fn is_available_check(status_code: u16, latency_ms: u64) -> bool {
    (200..400).contains(&status_code) && latency_ms < LATENCY_CEILING_MS
}

/// 统计窗口的起点，超出可表示的时间范围时取最早时间（即全部日志）
pub fn window_start(now: DateTime<Utc>, window_hours: u32) -> DateTime<Utc> {
    Duration::try_hours(i64::from(window_hours))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 单个目标的可用率报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeReport {
    /// 可用率百分比，保留两位小数
    pub uptime_percentage: f64,
    /// 检查总数
    pub total_checks: u64,
    /// 成功检查数
    pub successful_checks: u64,
    /// 统计窗口（小时）
    pub period_hours: u32,
    /// 估算的宕机分钟数
    ///
    /// 按每次失败检查 30 分钟粗略折算，并非实际宕机时长。
    pub downtime_minutes: u64,
}

impl UptimeReport {
    /// 空窗口报告
    pub fn empty(period_hours: u32) -> Self {
        Self {
            uptime_percentage: 0.0,
            total_checks: 0,
            successful_checks: 0,
            period_hours,
            downtime_minutes: 0,
        }
    }
}

/// 四舍五入到两位小数
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 汇总一组日志
pub fn summarize(logs: &[ProbeLog], period_hours: u32) -> UptimeReport {
    if logs.is_empty() {
        return UptimeReport::empty(period_hours);
    }

    let total_checks = logs.len() as u64;
    let successful_checks = logs
        .iter()
        .filter(|log| is_available_check(log.status_code, log.latency_ms))
        .count() as u64;
    let failed_checks = total_checks - successful_checks;

    UptimeReport {
        uptime_percentage: round2(successful_checks as f64 / total_checks as f64 * 100.0),
        total_checks,
        successful_checks,
        period_hours,
        downtime_minutes: failed_checks * DOWNTIME_MINUTES_PER_FAILED_CHECK,
    }
}

/// 带可用率的目标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetUptime {
    /// 目标
    pub target: Target,
    /// 可用率报告
    pub uptime: UptimeReport,
}

/// 用户仪表盘汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// 目标总数
    pub total_endpoints: usize,
    /// 当前未宕机的目标数
    pub up_count: usize,
    /// 有检查记录的目标的平均可用率，保留两位小数
    pub average_uptime_percentage: f64,
}

/// 可用率统计器
pub struct UptimeAggregator {
    store: Arc<dyn LogStore>,
    clock: Arc<dyn Clock>,
}

impl UptimeAggregator {
    /// 创建统计器
    pub fn new(store: Arc<dyn LogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 计算单个目标在最近 `window_hours` 小时内的可用率
    ///
    /// # 参数
    /// * `target_id` - 目标ID
    /// * `window_hours` - 统计窗口（小时）
    ///
    /// # 返回
    /// * `StoreResult<UptimeReport>` - 窗口内没有日志时返回空报告
    pub async fn compute_uptime(&self, target_id: TargetId, window_hours: u32) -> StoreResult<UptimeReport> {
        let now = self.clock.now();
        let from = window_start(now, window_hours);
        let logs = self.store.query_logs(target_id, from, now).await?;
        Ok(summarize(&logs, window_hours))
    }

    /// 列出用户的全部目标及其可用率
    pub async fn list_targets_with_uptime(&self, user_id: &str, window_hours: u32) -> StoreResult<Vec<TargetUptime>> {
        let now = self.clock.now();
        let from = window_start(now, window_hours);
        let windows = self.store.target_windows(user_id, from, now).await?;

        Ok(windows
            .into_iter()
            .map(|window| TargetUptime {
                uptime: summarize(&window.logs, window_hours),
                target: window.target,
            })
            .collect())
    }

    /// 计算用户仪表盘汇总
    pub async fn dashboard_stats(&self, user_id: &str, window_hours: u32) -> StoreResult<DashboardStats> {
        let targets = self.list_targets_with_uptime(user_id, window_hours).await?;
        Ok(dashboard_from(&targets))
    }
}

/// 由带可用率的目标列表生成仪表盘汇总
pub fn dashboard_from(targets: &[TargetUptime]) -> DashboardStats {
    let up_count = targets.iter().filter(|t| !t.target.is_down).count();
    let checked: Vec<f64> = targets
        .iter()
        .filter(|t| t.uptime.total_checks > 0)
        .map(|t| t.uptime.uptime_percentage)
        .collect();

    let average_uptime_percentage = if checked.is_empty() {
        0.0
    } else {
        round2(checked.iter().sum::<f64>() / checked.len() as f64)
    };

    DashboardStats {
        total_endpoints: targets.len(),
        up_count,
        average_uptime_percentage,
    }
}
