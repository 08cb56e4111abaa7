//! 监控调度器
//!
//! 后台循环按节拍依次驱动监控周期，周期之间执行持久化检查点和日志清理

use crate::error::MonitorError;
use crate::monitor::clock::{Clock, Ticker};
use crate::monitor::cycle::{MonitorCycle, TickReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 最近一个周期的摘要
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 耗时（毫秒）
    pub duration_ms: u64,
    /// 探测的目标数
    pub checked: usize,
    /// 宕机目标数
    pub down: usize,
    /// 错误数
    pub errors: usize,
}

impl From<&TickReport> for TickSummary {
    fn from(report: &TickReport) -> Self {
        Self {
            started_at: report.started_at,
            duration_ms: report.duration_ms,
            checked: report.checked(),
            down: report.down(),
            errors: report.error_count(),
        }
    }
}

/// 通知统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationStats {
    /// 总通知发送次数
    pub total_sent: u64,
    /// 通知发送成功次数
    pub successful_sent: u64,
    /// 通知发送失败次数
    pub failed_sent: u64,
}

/// 调度器状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 已完成的周期数
    pub ticks_completed: u64,
    /// 因上一周期未结束而跳过的周期数
    pub ticks_skipped: u64,
    /// 加载目标失败的周期数
    pub ticks_failed: u64,
    /// 已清理的过期日志条数
    pub logs_pruned: u64,
    /// 最近一个周期
    pub last_tick: Option<TickSummary>,
    /// 通知统计
    pub notification_stats: NotificationStats,
}

/// 调度器trait
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器
    ///
    /// # 参数
    /// * `ticker` - 节拍源
    ///
    /// # 返回
    /// * `Result<(), MonitorError>` - 已在运行时返回错误
    async fn start(&self, ticker: Box<dyn Ticker>) -> Result<(), MonitorError>;

    /// 停止调度器，进行中的周期会被放弃
    async fn stop(&self) -> Result<(), MonitorError>;

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 监控调度器实现
pub struct MonitorScheduler {
    /// 周期编排器
    cycle: Arc<MonitorCycle>,
    /// 时间来源
    clock: Arc<dyn Clock>,
    /// 日志保留时长
    log_retention: Option<chrono::Duration>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
    /// 停止信号
    shutdown_tx: broadcast::Sender<()>,
    /// 后台任务
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorScheduler {
    /// 创建调度器
    ///
    /// # 参数
    /// * `cycle` - 周期编排器
    /// * `clock` - 时间来源
    pub fn new(cycle: Arc<MonitorCycle>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            cycle,
            clock,
            log_retention: None,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// 设置日志保留时长，每个周期后清理更早的日志
    pub fn with_log_retention(mut self, retention: chrono::Duration) -> Self {
        self.log_retention = Some(retention);
        self
    }

    /// 等待后台循环结束（节拍源结束或收到停止信号）
    pub async fn wait(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("调度循环异常退出: {}", e);
                }
            }
        }
    }

    /// 记录周期结果并执行检查点与清理
    async fn after_tick(
        cycle: &MonitorCycle,
        clock: &dyn Clock,
        log_retention: Option<chrono::Duration>,
        status: &RwLock<SchedulerStatus>,
        result: Result<TickReport, MonitorError>,
    ) {
        match result {
            Ok(report) => {
                let mut status = status.write().await;
                status.ticks_completed += 1;
                let sent = report.alerts_sent() as u64;
                let failed = report.alerts_failed() as u64;
                status.notification_stats.total_sent += sent + failed;
                status.notification_stats.successful_sent += sent;
                status.notification_stats.failed_sent += failed;
                status.last_tick = Some(TickSummary::from(&report));
            }
            Err(MonitorError::TickInProgress) => {
                warn!("上一个监控周期仍在运行，跳过本次节拍");
                status.write().await.ticks_skipped += 1;
                return;
            }
            Err(e) => {
                error!("监控周期失败: {}", e);
                status.write().await.ticks_failed += 1;
            }
        }

        let store = cycle.store();
        if let Some(retention) = log_retention {
            match clock.now().checked_sub_signed(retention) {
                Some(cutoff) => match store.prune_logs_before(cutoff).await {
                    Ok(0) => {}
                    Ok(pruned) => {
                        debug!("清理过期探测日志 {} 条", pruned);
                        status.write().await.logs_pruned += pruned as u64;
                    }
                    Err(e) => error!("清理过期探测日志失败: {}", e),
                },
                None => warn!("日志保留时长超出时间范围，跳过清理"),
            }
        }

        if let Err(e) = store.checkpoint().await {
            error!("保存存储检查点失败: {}", e);
        }
    }
}

#[async_trait]
impl Scheduler for MonitorScheduler {
    async fn start(&self, mut ticker: Box<dyn Ticker>) -> Result<(), MonitorError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(MonitorError::Scheduler("调度器已在运行".to_string()));
        }

        info!("启动监控调度器");
        self.status.write().await.is_running = true;

        let cycle = Arc::clone(&self.cycle);
        let clock = Arc::clone(&self.clock);
        let status = Arc::clone(&self.status);
        let log_retention = self.log_retention;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    more = ticker.tick() => {
                        if !more {
                            info!("节拍源已结束");
                            break;
                        }
                    }
                }

                let result = tokio::select! {
                    _ = shutdown_rx.recv() => {
                        warn!("收到停止信号，放弃进行中的监控周期");
                        break;
                    }
                    result = cycle.run_tick() => result,
                };

                Self::after_tick(&cycle, clock.as_ref(), log_retention, &status, result).await;
            }

            status.write().await.is_running = false;
            info!("监控调度循环已退出");
        }));

        Ok(())
    }

    async fn stop(&self) -> Result<(), MonitorError> {
        info!("停止监控调度器");
        // 没有接收者说明循环已经退出
        let _ = self.shutdown_tx.send(());
        self.wait().await;
        self.status.write().await.is_running = false;
        info!("监控调度器已停止");
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }
}
