//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{ConfigLoader, TomlConfigLoader};
use crate::core::ServiceLauncher;
use crate::error::{PingBotError, Result};
use crate::monitor::uptime::dashboard_from;
use crate::monitor::{
    is_available_check, is_probe_success, DashboardStats, SystemClock, TargetUptime,
    UptimeAggregator,
};
use crate::probe::{HttpProbeExecutor, ProbeExecutor, ProbeOutcome};
use crate::store::{AlertRecord, AlertStore, LogStore};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 示例配置文件内容
const SAMPLE_CONFIG: &str = include_str!("../../config/pingbot.example.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await?;
        }
        Ok(())
    }
}

impl InitCommand {
    /// 创建配置文件，返回是否实际写入
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<bool> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(false);
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, SAMPLE_CONFIG).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加用户和监控目标");

        Ok(true)
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, args.is_verbose())
                .await?;
        }
        Ok(())
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        println!("✓ 配置文件验证通过");
        println!(
            "✓ 找到 {} 个用户、{} 个监控目标",
            config.users.len(),
            config.targets.len()
        );

        if verbose {
            println!("全局配置:");
            println!("  周期间隔: {}秒", config.global.check_interval_seconds);
            println!("  请求超时: {}秒", config.global.request_timeout_seconds);
            println!("  最大并发: {}", config.global.max_concurrent_checks);
            println!("  统计窗口: {}小时", config.global.uptime_window_hours);
            println!("  日志级别: {}", config.global.log_level);
            println!(
                "邮件通知: {}",
                if config.mail.enabled { "启用" } else { "未启用" }
            );

            println!("监控目标:");
            for (i, target) in config.targets.iter().enumerate() {
                println!("  {}. {} ({})", i + 1, target.name, target.url);
                println!("     所属用户: {}", target.user_id);
                println!(
                    "     宕机邮件: {}",
                    if target.send_email_on_down { "是" } else { "否" }
                );
                println!("     启用状态: {}", if target.is_active { "是" } else { "否" });
            }
        }

        Ok(())
    }
}

/// 单次探测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check {
            url,
            timeout,
            format,
        } = &args.command
        {
            let executor = HttpProbeExecutor::new(Duration::from_secs(*timeout))?;
            let outcome = executor.probe(url).await;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&check_report(url, &outcome))?);
                }
                OutputFormat::Text => print!("{}", render_check(url, &outcome)),
            }
        }
        Ok(())
    }
}

/// 单次探测的JSON结果
fn check_report(url: &str, outcome: &ProbeOutcome) -> serde_json::Value {
    serde_json::json!({
        "url": url,
        "status_code": outcome.logged_status_code(),
        "latency_ms": outcome.latency_ms(),
        "up": is_probe_success(outcome),
        "available": is_available_check(outcome.logged_status_code(), outcome.latency_ms()),
        "error": outcome.error_description(),
    })
}

/// 单次探测的文本结果
fn render_check(url: &str, outcome: &ProbeOutcome) -> String {
    let icon = if is_probe_success(outcome) { "✓" } else { "✗" };
    let status = match outcome.status_code() {
        Some(code) => format!("HTTP {code}"),
        None => "无响应".to_string(),
    };

    let mut out = format!("{icon} {url} - {status} - {}ms\n", outcome.latency_ms());
    if is_probe_success(outcome)
        && !is_available_check(outcome.logged_status_code(), outcome.latency_ms())
    {
        out.push_str("  注意: 响应过慢，不计入可用率\n");
    }
    if let Some(error) = outcome.error_description() {
        out.push_str(&format!("  错误: {error}\n"));
    }
    out
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start {
            interval,
            max_concurrent,
        } = &args.command
        {
            let shutdown_rx = ServiceLauncher::listen_for_ctrl_c();
            ServiceLauncher::run_foreground(
                &args.get_config_path(),
                *interval,
                *max_concurrent,
                shutdown_rx,
            )
            .await?;
        }
        Ok(())
    }
}

/// 可用率统计命令
pub struct UptimeCommand;

#[async_trait]
impl Command for UptimeCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Uptime {
            user,
            hours,
            format,
        } = &args.command
        {
            let config = load_config(args).await?;
            let store = ServiceLauncher::open_store(&config).await?;
            ServiceLauncher::seed_store(&store, &config).await?;

            let user_ids: Vec<String> = match user {
                Some(id) => vec![id.clone()],
                None => config.users.iter().map(|u| u.id.clone()).collect(),
            };
            let window_hours = hours.unwrap_or(config.global.uptime_window_hours);
            if window_hours == 0 {
                return Err(PingBotError::Other(anyhow::anyhow!("统计窗口不能为0")));
            }

            let log_store: Arc<dyn LogStore> = store;
            let aggregator = UptimeAggregator::new(log_store, Arc::new(SystemClock));

            let mut sections = Vec::with_capacity(user_ids.len());
            for user_id in &user_ids {
                let targets = aggregator
                    .list_targets_with_uptime(user_id, window_hours)
                    .await?;
                let dashboard = dashboard_from(&targets);
                sections.push((user_id.as_str(), targets, dashboard));
            }

            match format {
                OutputFormat::Json => {
                    let users: Vec<_> = sections
                        .iter()
                        .map(|(user_id, targets, dashboard)| {
                            serde_json::json!({
                                "user_id": user_id,
                                "window_hours": window_hours,
                                "dashboard": dashboard,
                                "targets": targets,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&users)?);
                }
                OutputFormat::Text => {
                    for (user_id, targets, dashboard) in &sections {
                        print!("{}", render_uptime(user_id, window_hours, targets, dashboard));
                    }
                }
            }
        }
        Ok(())
    }
}

/// 可用率的文本表格
fn render_uptime(
    user_id: &str,
    window_hours: u32,
    targets: &[TargetUptime],
    dashboard: &DashboardStats,
) -> String {
    let mut out = format!(
        "用户 {user_id}（最近 {window_hours} 小时）: 共 {} 个目标，{} 个正常，平均可用率 {:.2}%\n",
        dashboard.total_endpoints, dashboard.up_count, dashboard.average_uptime_percentage
    );
    if targets.is_empty() {
        return out;
    }

    out.push_str(&format!(
        "{:<20} {:<8} {:<10} {:<12} {:<10}\n",
        "目标名称", "状态", "可用率", "检查次数", "宕机(分)"
    ));
    out.push_str(&format!("{}\n", "-".repeat(64)));
    for entry in targets {
        let status = if !entry.target.is_active {
            "停用"
        } else if entry.target.is_down {
            "宕机"
        } else {
            "正常"
        };
        out.push_str(&format!(
            "{:<20} {:<8} {:<10} {:<12} {:<10}\n",
            entry.target.name,
            status,
            format!("{:.2}%", entry.uptime.uptime_percentage),
            format!(
                "{}/{}",
                entry.uptime.successful_checks, entry.uptime.total_checks
            ),
            entry.uptime.downtime_minutes
        ));
    }
    out
}

/// 告警历史命令
pub struct AlertsCommand;

#[async_trait]
impl Command for AlertsCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Alerts { user, format } = &args.command {
            let config = load_config(args).await?;
            let store = ServiceLauncher::open_store(&config).await?;
            let alerts = store.list_alerts(user).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&alerts)?),
                OutputFormat::Text => print!("{}", render_alerts(user, &alerts)),
            }
        }
        Ok(())
    }
}

/// 告警历史的文本列表
fn render_alerts(user_id: &str, alerts: &[AlertRecord]) -> String {
    if alerts.is_empty() {
        return format!("用户 {user_id} 没有告警记录\n");
    }

    let mut out = format!("用户 {user_id} 共有 {} 条告警记录:\n", alerts.len());
    for alert in alerts {
        let target = alert
            .target_id
            .map(|id| format!("目标 #{id}"))
            .unwrap_or_else(|| "目标已删除".to_string());
        out.push_str(&format!(
            "  {} [{}] {}\n",
            alert.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            target,
            alert.subject
        ));
    }
    out
}

/// 读取命令行指定的配置
async fn load_config(args: &Args) -> Result<crate::config::Config> {
    TomlConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::UptimeReport;
    use crate::probe::TransportErrorKind;
    use crate::store::Target;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sample_config_is_valid() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(SAMPLE_CONFIG).await.unwrap();
        assert!(!config.targets.is_empty());
        assert!(!config.mail.enabled);
    }

    #[tokio::test]
    async fn test_init_does_not_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pingbot.toml");

        assert!(InitCommand.create_config_file(&path, false).await.unwrap());
        tokio::fs::write(&path, "# edited").await.unwrap();

        assert!(!InitCommand.create_config_file(&path, false).await.unwrap());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# edited");

        assert!(InitCommand.create_config_file(&path, true).await.unwrap());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), SAMPLE_CONFIG);
    }

    #[test]
    fn test_check_report_for_transport_failure() {
        let outcome = ProbeOutcome::transport_failure(TransportErrorKind::Timeout, "deadline", 4000);
        let report = check_report("https://example.com", &outcome);

        assert_eq!(report["status_code"], 0);
        assert_eq!(report["up"], false);
        assert_eq!(report["available"], false);
        assert!(report["error"].as_str().unwrap().contains("deadline"));

        let text = render_check("https://example.com", &outcome);
        assert!(text.starts_with("✗"));
        assert!(text.contains("无响应"));
    }

    #[test]
    fn test_render_check_flags_slow_response() {
        let slow = ProbeOutcome::response(200, 31_000);
        let text = render_check("https://example.com", &slow);
        assert!(text.starts_with("✓"));
        assert!(text.contains("响应过慢"));

        let fast = ProbeOutcome::response(204, 120);
        assert!(!render_check("https://example.com", &fast).contains("响应过慢"));
    }

    #[test]
    fn test_render_uptime_table() {
        let target = Target {
            id: 1,
            user_id: "u1".to_string(),
            name: "API".to_string(),
            url: "https://api.example.com".to_string(),
            send_email_on_down: true,
            is_active: true,
            is_down: true,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        };
        let targets = vec![TargetUptime {
            target,
            uptime: UptimeReport {
                uptime_percentage: 70.0,
                total_checks: 10,
                successful_checks: 7,
                period_hours: 24,
                downtime_minutes: 90,
            },
        }];
        let dashboard = dashboard_from(&targets);

        let text = render_uptime("u1", 24, &targets, &dashboard);
        assert!(text.contains("共 1 个目标，0 个正常"));
        assert!(text.contains("70.00%"));
        assert!(text.contains("7/10"));
        assert!(text.contains("宕机"));
    }

    #[test]
    fn test_render_alerts_marks_deleted_targets() {
        assert!(render_alerts("u1", &[]).contains("没有告警记录"));

        let alerts = vec![AlertRecord {
            id: uuid::Uuid::new_v4(),
            target_id: None,
            user_id: "u1".to_string(),
            subject: "🚨 Endpoint Down Alert: API".to_string(),
            body: String::new(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        }];
        let text = render_alerts("u1", &alerts);
        assert!(text.contains("目标已删除"));
        assert!(text.contains("2025-06-01 10:00:00 UTC"));
    }
}
