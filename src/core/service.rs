//! 服务管理模块
//!
//! 负责配置加载、存储初始化、组件装配和生命周期管理

use crate::config::{self, ConfigLoader, MailConfig, TomlConfigLoader};
use crate::monitor::{
    Clock, IntervalTicker, MonitorCycle, MonitorScheduler, Scheduler, SystemClock,
};
use crate::notification::{AlertComposer, MailSender, NoOpSender, ResendMailer};
use crate::probe::HttpProbeExecutor;
use crate::store::{MemoryStore, MonitorStore, NewTarget, TargetStore, User};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 配置同步到存储的结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    /// 同步的用户数
    pub users: usize,
    /// 新建的目标数
    pub targets_created: usize,
    /// 已存在而跳过的目标数
    pub targets_existing: usize,
}

/// 服务组件结构
pub struct ServiceComponents {
    /// 存储
    pub store: Arc<MemoryStore>,
    /// 周期编排器
    pub cycle: Arc<MonitorCycle>,
    /// 调度器
    pub scheduler: Arc<MonitorScheduler>,
}

/// 服务启动器
pub struct ServiceLauncher;

impl ServiceLauncher {
    /// 加载和验证配置
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `interval` - 命令行覆盖的周期间隔（秒）
    /// * `max_concurrent` - 命令行覆盖的最大并发数
    pub async fn load_and_validate_config(
        config_path: &Path,
        interval: Option<u64>,
        max_concurrent: Option<usize>,
    ) -> Result<config::Config> {
        info!("加载配置文件: {:?}", config_path);

        let config_loader = TomlConfigLoader::new(true);
        let mut config = config_loader
            .load_from_file(config_path)
            .await
            .context("加载配置文件失败")?;

        // 应用命令行参数覆盖
        if let Some(interval) = interval {
            config.global.check_interval_seconds = interval;
        }
        if let Some(max_concurrent) = max_concurrent {
            config.global.max_concurrent_checks = max_concurrent;
        }

        config::validate_config(&config).map_err(|e| anyhow::anyhow!("配置验证失败: {}", e))?;

        info!(
            "配置加载成功，共 {} 个用户、{} 个监控目标",
            config.users.len(),
            config.targets.len()
        );
        Ok(config)
    }

    /// 打开存储：配置了快照路径时从快照恢复，否则使用纯内存存储
    pub async fn open_store(config: &config::Config) -> Result<Arc<MemoryStore>> {
        let store = match &config.store.snapshot_path {
            Some(path) => MemoryStore::open(path)
                .await
                .with_context(|| format!("打开存储快照失败: {}", path.display()))?,
            None => {
                warn!("未配置快照路径，状态只保存在内存中");
                MemoryStore::new()
            }
        };
        Ok(Arc::new(store))
    }

    /// 把配置中的用户和目标同步进存储
    ///
    /// 用户总是以配置为准；目标按 (用户, URL) 去重，已存在的目标
    /// 保留存储中的状态，不被配置覆盖。
    pub async fn seed_store(store: &MemoryStore, config: &config::Config) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for user in &config.users {
            let created_at = store
                .get_user(&user.id)
                .await?
                .map(|existing| existing.created_at)
                .unwrap_or_else(|| store.now());
            store
                .upsert_user(User {
                    id: user.id.clone(),
                    name: user.name.clone(),
                    email: user.email.clone(),
                    created_at,
                })
                .await;
            summary.users += 1;
        }

        for target in &config.targets {
            if store.find_target_by_url(&target.user_id, &target.url).await.is_some() {
                summary.targets_existing += 1;
                continue;
            }
            store
                .create_target(&target.user_id, NewTarget::from(target))
                .await
                .with_context(|| format!("创建监控目标失败: {}", target.name))?;
            summary.targets_created += 1;
        }

        info!(
            "存储同步完成: 用户 {} 个，新建目标 {} 个，已有目标 {} 个",
            summary.users, summary.targets_created, summary.targets_existing
        );
        Ok(summary)
    }

    /// 根据邮件配置创建发送器，未启用时返回空发送器
    pub fn build_mailer(mail: &MailConfig) -> Result<Arc<dyn MailSender>> {
        if !mail.enabled {
            info!("邮件通知未启用，告警只记录不发送");
            return Ok(Arc::new(NoOpSender));
        }

        let api_key = mail
            .api_key
            .clone()
            .context("启用邮件时必须配置 api_key")?;
        let from = mail.from.clone().context("启用邮件时必须配置发件人 from")?;

        let mailer = ResendMailer::new(mail.api_base.clone(), api_key, from, mail.timeout())
            .context("创建邮件发送器失败")?;
        Ok(Arc::new(mailer))
    }

    /// 初始化服务组件
    pub async fn initialize_service_components(config: &config::Config) -> Result<ServiceComponents> {
        info!("初始化服务组件...");

        let store = Self::open_store(config).await?;
        Self::seed_store(&store, config).await?;
        // 同步后的状态立即落盘
        store.checkpoint().await.context("保存存储快照失败")?;

        let prober = Arc::new(HttpProbeExecutor::new(config.global.request_timeout())?);
        let mailer = Self::build_mailer(&config.mail)?;
        let composer = Arc::new(
            AlertComposer::with_overrides(
                config.mail.subject_template.as_deref(),
                config.mail.body_template.as_deref(),
            )
            .context("注册告警模板失败")?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let monitor_store: Arc<dyn MonitorStore> = store.clone();
        let cycle = Arc::new(
            MonitorCycle::new(monitor_store, prober, mailer, composer, clock.clone())
                .with_max_concurrent(config.global.max_concurrent_checks)
                .with_mail_timeout(config.mail.timeout()),
        );

        let mut scheduler = MonitorScheduler::new(cycle.clone(), clock);
        if let Some(retention) = config.store.log_retention() {
            scheduler = scheduler.with_log_retention(retention);
        }

        Ok(ServiceComponents {
            store,
            cycle,
            scheduler: Arc::new(scheduler),
        })
    }

    /// 启动后台调度
    pub async fn start_background_tasks(
        service_components: &ServiceComponents,
        config: &config::Config,
    ) -> Result<()> {
        info!(
            "启动后台任务，周期间隔 {} 秒",
            config.global.check_interval_seconds
        );

        let ticker = IntervalTicker::new(config.global.check_interval());
        service_components
            .scheduler
            .start(Box::new(ticker))
            .await
            .context("启动调度器失败")?;
        Ok(())
    }

    /// 监听 Ctrl-C，收到后广播关闭信号
    ///
    /// 无法监听信号时服务持续运行，不会被误关闭。
    pub fn listen_for_ctrl_c() -> broadcast::Receiver<()> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("收到中断信号");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    error!("监听中断信号失败: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        });
        shutdown_rx
    }

    /// 在前台运行监控服务，直到收到关闭信号
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `interval` - 覆盖配置中的周期间隔（秒）
    /// * `max_concurrent` - 覆盖配置中的最大并发数
    /// * `shutdown_rx` - 关闭信号
    pub async fn run_foreground(
        config_path: &Path,
        interval: Option<u64>,
        max_concurrent: Option<usize>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("以前台模式启动监控服务...");

        let config = Self::load_and_validate_config(config_path, interval, max_concurrent).await?;
        let components = Self::initialize_service_components(&config).await?;
        Self::start_background_tasks(&components, &config).await?;
        Self::handle_shutdown_and_cleanup(shutdown_rx, &components).await
    }

    /// 处理关闭和清理
    pub async fn handle_shutdown_and_cleanup(
        mut shutdown_rx: broadcast::Receiver<()>,
        service_components: &ServiceComponents,
    ) -> Result<()> {
        info!("等待关闭信号...");

        let _ = shutdown_rx.recv().await;

        info!("收到关闭信号，正在停止服务...");

        service_components.scheduler.stop().await?;

        let status = service_components.scheduler.get_status().await;
        info!(
            "共完成 {} 个监控周期，跳过 {} 个，失败 {} 个",
            status.ticks_completed, status.ticks_skipped, status.ticks_failed
        );

        service_components
            .store
            .checkpoint()
            .await
            .context("保存最终存储快照失败")?;

        info!("服务已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, TargetConfig, UserConfig};
    use crate::store::TargetStore;
    use tempfile::TempDir;

    fn config_with_targets() -> Config {
        Config {
            users: vec![UserConfig {
                id: "u1".to_string(),
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
            }],
            targets: vec![
                TargetConfig {
                    user_id: "u1".to_string(),
                    name: "API".to_string(),
                    url: "https://api.example.com".to_string(),
                    send_email_on_down: true,
                    is_active: true,
                },
                TargetConfig {
                    user_id: "u1".to_string(),
                    name: "Docs".to_string(),
                    url: "https://docs.example.com".to_string(),
                    send_email_on_down: false,
                    is_active: false,
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_seed_store_is_idempotent() {
        let store = MemoryStore::new();
        let config = config_with_targets();

        let first = ServiceLauncher::seed_store(&store, &config).await.unwrap();
        assert_eq!(first.users, 1);
        assert_eq!(first.targets_created, 2);

        let second = ServiceLauncher::seed_store(&store, &config).await.unwrap();
        assert_eq!(second.targets_created, 0);
        assert_eq!(second.targets_existing, 2);

        let targets = store.list_user_targets("u1").await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(store.list_active_targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_keeps_existing_target_state() {
        let store = MemoryStore::new();
        let config = config_with_targets();
        ServiceLauncher::seed_store(&store, &config).await.unwrap();

        let api = store
            .find_target_by_url("u1", "https://api.example.com")
            .await
            .unwrap();
        store.update_down_state(api.id, true).await.unwrap();

        ServiceLauncher::seed_store(&store, &config).await.unwrap();
        let api = store.get_target(api.id).await.unwrap().unwrap();
        assert!(api.is_down);
    }

    #[tokio::test]
    async fn test_seed_timestamps_follow_store_clock() {
        use crate::monitor::ManualClock;
        use chrono::TimeZone;

        let at = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let store = MemoryStore::new().with_clock(Arc::new(ManualClock::new(at)));
        ServiceLauncher::seed_store(&store, &config_with_targets())
            .await
            .unwrap();

        assert_eq!(store.get_user("u1").await.unwrap().unwrap().created_at, at);
        let targets = store.list_user_targets("u1").await.unwrap();
        assert!(targets.iter().all(|target| target.created_at == at));
    }

    #[test]
    fn test_build_mailer_selects_sender() {
        let disabled = ServiceLauncher::build_mailer(&MailConfig::default()).unwrap();
        assert_eq!(disabled.name(), NoOpSender.name());

        let enabled = MailConfig {
            enabled: true,
            api_key: Some("re_test".to_string()),
            from: Some("PingBot <alerts@example.com>".to_string()),
            ..Default::default()
        };
        let mailer = ServiceLauncher::build_mailer(&enabled).unwrap();
        assert_ne!(mailer.name(), NoOpSender.name());

        let missing_key = MailConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(ServiceLauncher::build_mailer(&missing_key).is_err());
    }

    #[tokio::test]
    async fn test_components_persist_seeded_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("state.json");
        let mut config = config_with_targets();
        config.store.snapshot_path = Some(snapshot.clone());

        let components = ServiceLauncher::initialize_service_components(&config)
            .await
            .unwrap();
        assert!(snapshot.exists());
        assert!(!components.scheduler.get_status().await.is_running);

        let reopened = MemoryStore::open(&snapshot).await.unwrap();
        assert_eq!(reopened.list_user_targets("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_config_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pingbot.toml");
        tokio::fs::write(&path, "[global]\ncheck_interval_seconds = 30\n")
            .await
            .unwrap();

        let config = ServiceLauncher::load_and_validate_config(&path, Some(60), Some(8))
            .await
            .unwrap();
        assert_eq!(config.global.check_interval_seconds, 60);
        assert_eq!(config.global.max_concurrent_checks, 8);

        // 覆盖后的间隔不能小于请求超时
        let invalid = ServiceLauncher::load_and_validate_config(&path, Some(2), None).await;
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn test_run_foreground_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("pingbot.toml");
        let snapshot = dir.path().join("state.json");
        let toml = format!(
            "[global]\ncheck_interval_seconds = 60\nrequest_timeout_seconds = 5\n\n[store]\nsnapshot_path = {:?}\n\n[[users]]\nid = \"u1\"\nname = \"Alice\"\nemail = \"alice@example.com\"\n",
            snapshot.to_string_lossy()
        );
        tokio::fs::write(&config_path, toml).await.unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let service = tokio::spawn(async move {
            ServiceLauncher::run_foreground(&config_path, None, None, shutdown_rx).await
        });

        // 等待启动时的检查点写出
        for _ in 0..100 {
            if snapshot.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(snapshot.exists());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), service)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let reopened = MemoryStore::open(&snapshot).await.unwrap();
        assert!(reopened.get_user("u1").await.unwrap().is_some());
    }
}
