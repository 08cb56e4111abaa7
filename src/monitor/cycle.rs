//! 监控周期编排
//!
//! 一个周期内：加载启用的目标，并发探测，计算状态转换，
//! 原子地写入探测日志与宕机状态，需要时组装、记录并发送告警。

use crate::error::{MonitorError, NotificationError};
use crate::logging::{alert_log, probe_log, tick_log};
use crate::monitor::clock::Clock;
use crate::monitor::liveness::{self, Transition};
use crate::notification::{AlertComposer, MailSender};
use crate::probe::{ProbeExecutor, ProbeOutcome};
use crate::store::{MonitorStore, Target, TargetId};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 默认最大并发探测数
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 50;

/// 默认邮件发送超时
pub const DEFAULT_MAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// 告警处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AlertDelivery {
    /// 无需告警
    NotDue,
    /// 已发送
    Sent,
    /// 发送失败，不重试
    Failed(String),
    /// 告警前置步骤失败，未发送
    Skipped(String),
}

/// 单个目标在本周期的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    /// 目标ID
    pub target_id: TargetId,
    /// 目标名称
    pub target_name: String,
    /// 探测结果
    pub outcome: ProbeOutcome,
    /// 状态转换
    pub transition: Transition,
    /// 日志与状态是否已提交
    pub committed: bool,
    /// 告警处理结果
    pub alert: AlertDelivery,
    /// 处理过程中的错误
    pub errors: Vec<String>,
}

/// 一个监控周期的汇总
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 耗时（毫秒）
    pub duration_ms: u64,
    /// 各目标处理结果
    pub targets: Vec<TargetReport>,
}

impl TickReport {
    /// 探测的目标数
    pub fn checked(&self) -> usize {
        self.targets.len()
    }

    /// 本周期结束后处于宕机状态的目标数
    pub fn down(&self) -> usize {
        self.targets.iter().filter(|t| t.transition.is_down()).count()
    }

    /// 成功发送的告警数
    pub fn alerts_sent(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.alert == AlertDelivery::Sent)
            .count()
    }

    /// 发送失败的告警数
    pub fn alerts_failed(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.alert, AlertDelivery::Failed(_)))
            .count()
    }

    /// 错误总数
    pub fn error_count(&self) -> usize {
        self.targets.iter().map(|t| t.errors.len()).sum()
    }
}

/// 监控周期编排器
pub struct MonitorCycle {
    store: Arc<dyn MonitorStore>,
    prober: Arc<dyn ProbeExecutor>,
    mailer: Arc<dyn MailSender>,
    composer: Arc<AlertComposer>,
    clock: Arc<dyn Clock>,
    max_concurrent: usize,
    mail_timeout: Duration,
    /// 保证周期不重叠
    tick_lock: Mutex<()>,
}

impl MonitorCycle {
    /// 创建编排器
    ///
    /// # 参数
    /// * `store` - 目标、日志和告警存储
    /// * `prober` - 探测器
    /// * `mailer` - 邮件发送器
    /// * `composer` - 告警消息组装器
    /// * `clock` - 时间来源
    pub fn new(
        store: Arc<dyn MonitorStore>,
        prober: Arc<dyn ProbeExecutor>,
        mailer: Arc<dyn MailSender>,
        composer: Arc<AlertComposer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            prober,
            mailer,
            composer,
            clock,
            max_concurrent: DEFAULT_MAX_CONCURRENT_CHECKS,
            mail_timeout: DEFAULT_MAIL_TIMEOUT,
            tick_lock: Mutex::new(()),
        }
    }

    /// 设置最大并发探测数
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// 设置邮件发送超时
    pub fn with_mail_timeout(mut self, mail_timeout: Duration) -> Self {
        self.mail_timeout = mail_timeout;
        self
    }

    /// 存储句柄
    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    /// 执行一个监控周期
    ///
    /// 已有周期在运行时立即返回 [`MonitorError::TickInProgress`]。
    /// 单个目标的错误记录在报告中，不会中断其他目标。
    ///
    /// # 返回
    /// * `Result<TickReport, MonitorError>` - 周期汇总
    pub async fn run_tick(&self) -> Result<TickReport, MonitorError> {
        let _guard = self
            .tick_lock
            .try_lock()
            .map_err(|_| MonitorError::TickInProgress)?;

        let started_at = self.clock.now();
        let start_time = Instant::now();

        let targets = self
            .store
            .list_active_targets()
            .await
            .map_err(MonitorError::LoadTargets)?;
        debug!("本周期需要探测 {} 个目标", targets.len());

        let targets: Vec<TargetReport> = stream::iter(targets.into_iter().map(|target| self.process_target(target)))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let report = TickReport {
            started_at,
            duration_ms: start_time.elapsed().as_millis() as u64,
            targets,
        };

        tick_log(
            report.checked(),
            report.down(),
            report.alerts_sent(),
            report.error_count(),
            report.duration_ms,
        );

        Ok(report)
    }

    /// 单个目标的处理流水线
    async fn process_target(&self, target: Target) -> TargetReport {
        let outcome = self.prober.probe(&target.url).await;
        let checked_at = self.clock.now();
        let transition = liveness::evaluate(target.is_down, target.send_email_on_down, &outcome);

        let mut errors = Vec::new();

        probe_log(
            target.id,
            &target.name,
            outcome.logged_status_code(),
            outcome.latency_ms(),
            transition.is_down(),
            outcome.error_description().as_deref(),
        );

        let committed = match self
            .store
            .commit_probe(
                target.id,
                outcome.logged_status_code(),
                outcome.latency_ms(),
                checked_at,
                transition.is_down(),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!("写入探测结果失败 {}: {}", target.name, e);
                errors.push(e.to_string());
                false
            }
        };

        if transition.entered_down_episode() {
            warn!("目标进入宕机状态: {} ({})", target.name, target.url);
        } else if transition.recovered() && committed {
            info!("目标已恢复: {} ({})", target.name, target.url);
        }

        // 未提交的转换不发送告警，由下个周期重新判定
        let alert = if !transition.alert_due {
            AlertDelivery::NotDue
        } else if !committed {
            AlertDelivery::Skipped("探测结果未提交".to_string())
        } else {
            self.dispatch_alert(&target, &outcome, checked_at, &mut errors).await
        };

        TargetReport {
            target_id: target.id,
            target_name: target.name,
            outcome,
            transition,
            committed,
            alert,
            errors,
        }
    }

    /// 组装、记录并发送告警
    async fn dispatch_alert(
        &self,
        target: &Target,
        outcome: &ProbeOutcome,
        checked_at: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> AlertDelivery {
        let user = match self.store.get_user(&target.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                let message = format!("目标 {} 的用户不存在: {}", target.name, target.user_id);
                error!("{}", message);
                errors.push(message.clone());
                return AlertDelivery::Skipped(message);
            }
            Err(e) => {
                error!("读取用户失败 {}: {}", target.user_id, e);
                errors.push(e.to_string());
                return AlertDelivery::Skipped(e.to_string());
            }
        };

        let message = match self.composer.compose(target, &user, outcome, checked_at) {
            Ok(message) => message,
            Err(e) => {
                error!("组装告警失败 {}: {}", target.name, e);
                errors.push(e.to_string());
                return AlertDelivery::Skipped(e.to_string());
            }
        };

        // 记录失败不阻止发送
        if let Err(e) = self
            .store
            .append_alert(
                &user.id,
                Some(target.id),
                &message.subject,
                &message.body,
                checked_at,
            )
            .await
        {
            error!("写入告警记录失败 {}: {}", target.name, e);
            errors.push(e.to_string());
        }

        let send_result = tokio::time::timeout(
            self.mail_timeout,
            self.mailer.send(&user.email, &message.subject, &message.body),
        )
        .await
        .unwrap_or_else(|_| {
            Err(NotificationError::SendError(format!(
                "{} 发送超时 ({}ms)",
                self.mailer.name(),
                self.mail_timeout.as_millis()
            )))
        });

        match send_result {
            Ok(()) => {
                alert_log(target.id, &user.email, true, None);
                AlertDelivery::Sent
            }
            Err(e) => {
                let reason = e.to_string();
                alert_log(target.id, &user.email, false, Some(&reason));
                errors.push(reason.clone());
                AlertDelivery::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::monitor::clock::ManualClock;
    use crate::probe::TransportErrorKind;
    use crate::store::{
        AlertRecord, AlertStore, LogStore, MemoryStore, NewTarget, ProbeLog, TargetStore, TargetWindow, User,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    /// 按预设顺序返回结果的探测器
    struct ScriptedProber {
        outcomes: StdMutex<HashMap<String, VecDeque<ProbeOutcome>>>,
        delay: Duration,
    }

    impl ScriptedProber {
        fn new(script: Vec<(&str, Vec<ProbeOutcome>)>) -> Self {
            Self {
                outcomes: StdMutex::new(
                    script
                        .into_iter()
                        .map(|(url, outcomes)| (url.to_string(), outcomes.into()))
                        .collect(),
                ),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ProbeExecutor for ScriptedProber {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| ProbeOutcome::response(200, 1))
        }
    }

    /// 记录发送内容的邮件发送器
    #[derive(Default)]
    struct RecordingMailer {
        sent: StdMutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
            if self.fail {
                Err(NotificationError::SendError("smtp down".into()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    async fn seeded_store(urls: &[&str]) -> (Arc<MemoryStore>, Vec<Target>) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_user(User {
                id: "user_1".into(),
                name: "Alice".into(),
                email: "alice@example.com".into(),
                created_at: start(),
            })
            .await;

        let mut targets = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            let target = store
                .create_target(
                    "user_1",
                    NewTarget {
                        name: format!("target-{i}"),
                        url: url.to_string(),
                        send_email_on_down: true,
                        is_active: true,
                    },
                )
                .await
                .unwrap();
            targets.push(target);
        }
        (store, targets)
    }

    fn cycle(
        store: Arc<dyn MonitorStore>,
        prober: Arc<dyn ProbeExecutor>,
        mailer: Arc<dyn MailSender>,
        clock: Arc<ManualClock>,
    ) -> MonitorCycle {
        let composer = Arc::new(AlertComposer::with_overrides(None, None).unwrap());
        MonitorCycle::new(store, prober, mailer, composer, clock)
    }

    #[tokio::test]
    async fn test_down_episode_alerts_once() {
        let url = "https://api.example.com/health";
        let (store, targets) = seeded_store(&[url]).await;
        let prober = Arc::new(ScriptedProber::new(vec![(
            url,
            vec![
                ProbeOutcome::response(200, 10),
                ProbeOutcome::response(500, 10),
                ProbeOutcome::response(500, 10),
                ProbeOutcome::response(200, 10),
            ],
        )]));
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(ManualClock::new(start()));
        let cycle = cycle(store.clone(), prober, mailer.clone(), clock.clone());

        let mut down_sequence = Vec::new();
        for _ in 0..4 {
            cycle.run_tick().await.unwrap();
            clock.advance(chrono::Duration::seconds(5));
            let target = store.get_target(targets[0].id).await.unwrap().unwrap();
            down_sequence.push(target.is_down);
        }

        assert_eq!(down_sequence, vec![false, true, true, false]);
        assert_eq!(store.list_alerts("user_1").await.unwrap().len(), 1);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        let logs = store
            .query_logs(targets[0].id, start(), start() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        let codes: Vec<u16> = logs.iter().map(|l| l.status_code).collect();
        assert_eq!(codes, vec![200, 500, 500, 200]);
    }

    #[tokio::test]
    async fn test_transport_failure_logs_sentinel_status() {
        let url = "https://unreachable.example.com";
        let (store, targets) = seeded_store(&[url]).await;
        let prober = Arc::new(ScriptedProber::new(vec![(
            url,
            vec![ProbeOutcome::transport_failure(TransportErrorKind::Dns, "no such host", 3)],
        )]));
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(ManualClock::new(start()));

        let report = cycle(store.clone(), prober, mailer, clock).run_tick().await.unwrap();
        assert_eq!(report.alerts_sent(), 1);

        let logs = store
            .query_logs(targets[0].id, start(), start())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, 0);

        let alerts = store.list_alerts("user_1").await.unwrap();
        assert!(alerts[0].body.contains("HTTP 0"));
    }

    #[tokio::test]
    async fn test_mail_failure_keeps_committed_state() {
        let url = "https://api.example.com";
        let (store, targets) = seeded_store(&[url]).await;
        let prober = Arc::new(ScriptedProber::new(vec![(
            url,
            vec![ProbeOutcome::response(503, 10), ProbeOutcome::response(503, 10)],
        )]));
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let clock = Arc::new(ManualClock::new(start()));
        let cycle = cycle(store.clone(), prober, mailer.clone(), clock);

        let report = cycle.run_tick().await.unwrap();
        assert_eq!(report.alerts_failed(), 1);
        assert!(report.targets[0].committed);

        let target = store.get_target(targets[0].id).await.unwrap().unwrap();
        assert!(target.is_down);
        assert_eq!(store.list_alerts("user_1").await.unwrap().len(), 1);

        // 不重试
        let report = cycle.run_tick().await.unwrap();
        assert_eq!(report.targets[0].alert, AlertDelivery::NotDue);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_email_does_not_alert() {
        let url = "https://api.example.com";
        let (store, targets) = seeded_store(&[url]).await;
        store.toggle_send_email("user_1", targets[0].id).await.unwrap();

        let prober = Arc::new(ScriptedProber::new(vec![(url, vec![ProbeOutcome::response(500, 1)])]));
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(ManualClock::new(start()));

        let report = cycle(store.clone(), prober, mailer.clone(), clock).run_tick().await.unwrap();
        assert!(report.targets[0].transition.entered_down_episode());
        assert_eq!(report.targets[0].alert, AlertDelivery::NotDue);
        assert!(mailer.sent.lock().unwrap().is_empty());
        assert!(store.get_target(targets[0].id).await.unwrap().unwrap().is_down);
    }

    #[tokio::test]
    async fn test_inactive_targets_are_skipped() {
        let (store, targets) = seeded_store(&["https://a.example.com", "https://b.example.com"]).await;
        store.toggle_target_active("user_1", targets[1].id).await.unwrap();

        let prober = Arc::new(ScriptedProber::new(vec![]));
        let clock = Arc::new(ManualClock::new(start()));
        let report = cycle(store.clone(), prober, Arc::new(RecordingMailer::default()), clock)
            .run_tick()
            .await
            .unwrap();

        assert_eq!(report.checked(), 1);
        assert_eq!(report.targets[0].target_id, targets[0].id);
    }

    /// 对指定目标写入失败的存储
    struct FlakyStore {
        inner: MemoryStore,
        failing_target: TargetId,
    }

    #[async_trait]
    impl TargetStore for FlakyStore {
        async fn list_active_targets(&self) -> StoreResult<Vec<Target>> {
            self.inner.list_active_targets().await
        }
        async fn get_target(&self, id: TargetId) -> StoreResult<Option<Target>> {
            self.inner.get_target(id).await
        }
        async fn update_down_state(&self, id: TargetId, is_down: bool) -> StoreResult<()> {
            self.inner.update_down_state(id, is_down).await
        }
        async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
            self.inner.get_user(id).await
        }
        async fn list_user_targets(&self, user_id: &str) -> StoreResult<Vec<Target>> {
            self.inner.list_user_targets(user_id).await
        }
    }

    #[async_trait]
    impl LogStore for FlakyStore {
        async fn append_log(
            &self,
            target_id: TargetId,
            status_code: u16,
            latency_ms: u64,
            timestamp: DateTime<Utc>,
        ) -> StoreResult<ProbeLog> {
            self.inner.append_log(target_id, status_code, latency_ms, timestamp).await
        }
        async fn query_logs(
            &self,
            target_id: TargetId,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> StoreResult<Vec<ProbeLog>> {
            self.inner.query_logs(target_id, from, to).await
        }
        async fn target_windows(
            &self,
            user_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> StoreResult<Vec<TargetWindow>> {
            self.inner.target_windows(user_id, from, to).await
        }
        async fn prune_logs_before(&self, before: DateTime<Utc>) -> StoreResult<usize> {
            self.inner.prune_logs_before(before).await
        }
    }

    #[async_trait]
    impl AlertStore for FlakyStore {
        async fn append_alert(
            &self,
            user_id: &str,
            target_id: Option<TargetId>,
            subject: &str,
            body: &str,
            timestamp: DateTime<Utc>,
        ) -> StoreResult<AlertRecord> {
            self.inner
                .append_alert(user_id, target_id, subject, body, timestamp)
                .await
        }
        async fn list_alerts(&self, user_id: &str) -> StoreResult<Vec<AlertRecord>> {
            self.inner.list_alerts(user_id).await
        }
    }

    #[async_trait]
    impl MonitorStore for FlakyStore {
        async fn commit_probe(
            &self,
            target_id: TargetId,
            status_code: u16,
            latency_ms: u64,
            timestamp: DateTime<Utc>,
            is_down: bool,
        ) -> StoreResult<ProbeLog> {
            if target_id == self.failing_target {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner
                .commit_probe(target_id, status_code, latency_ms, timestamp, is_down)
                .await
        }
    }

    #[tokio::test]
    async fn test_store_error_does_not_abort_siblings() {
        let (a, b) = ("https://a.example.com", "https://b.example.com");
        let (memory, targets) = seeded_store(&[a, b]).await;
        let memory = Arc::try_unwrap(memory).ok().unwrap();
        let store = Arc::new(FlakyStore {
            inner: memory,
            failing_target: targets[0].id,
        });

        let prober = Arc::new(ScriptedProber::new(vec![
            (a, vec![ProbeOutcome::response(500, 1)]),
            (b, vec![ProbeOutcome::response(500, 1)]),
        ]));
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(ManualClock::new(start()));

        let report = cycle(store.clone(), prober, mailer.clone(), clock).run_tick().await.unwrap();
        assert_eq!(report.checked(), 2);

        let failed = report.targets.iter().find(|t| t.target_id == targets[0].id).unwrap();
        assert!(!failed.committed);
        assert!(matches!(failed.alert, AlertDelivery::Skipped(_)));
        assert_eq!(failed.errors.len(), 1);

        let ok = report.targets.iter().find(|t| t.target_id == targets[1].id).unwrap();
        assert!(ok.committed);
        assert_eq!(ok.alert, AlertDelivery::Sent);

        assert!(!store.get_target(targets[0].id).await.unwrap().unwrap().is_down);
        assert!(store.get_target(targets[1].id).await.unwrap().unwrap().is_down);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_tick_is_rejected() {
        let url = "https://slow.example.com";
        let (store, _targets) = seeded_store(&[url]).await;
        let prober = Arc::new(ScriptedProber::new(vec![]).with_delay(Duration::from_millis(200)));
        let clock = Arc::new(ManualClock::new(start()));
        let cycle = Arc::new(cycle(store, prober, Arc::new(RecordingMailer::default()), clock));

        let running = {
            let cycle = Arc::clone(&cycle);
            tokio::spawn(async move { cycle.run_tick().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(cycle.run_tick().await, Err(MonitorError::TickInProgress)));
        assert!(running.await.unwrap().is_ok());

        // 上一个周期结束后可以再次运行
        assert!(cycle.run_tick().await.is_ok());
    }
}
