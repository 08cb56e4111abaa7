//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::logging::parse_level;
use crate::monitor::cycle::DEFAULT_MAX_CONCURRENT_CHECKS;
use crate::monitor::uptime::DEFAULT_WINDOW_HOURS;
use crate::notification::composer::validate_templates;
use crate::store::memory::validate_target_url;
use crate::store::NewTarget;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 邮件配置
    #[serde(default)]
    pub mail: MailConfig,
    /// 存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// 用户列表
    #[serde(default)]
    pub users: Vec<UserConfig>,
    /// 监控目标列表
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 监控周期间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 单次探测超时（秒），必须小于监控周期间隔
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 最大并发探测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 可用率统计窗口（小时）
    #[serde(default = "default_uptime_window")]
    pub uptime_window_hours: u32,
    /// 日志文件路径，未配置时输出到控制台
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// 是否输出JSON格式日志
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            request_timeout_seconds: default_timeout(),
            max_concurrent_checks: default_max_concurrent(),
            log_level: default_log_level(),
            uptime_window_hours: default_uptime_window(),
            log_file: None,
            log_json: false,
        }
    }
}

impl GlobalConfig {
    /// 监控周期间隔
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// 探测超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// 邮件配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailConfig {
    /// 是否发送邮件
    #[serde(default)]
    pub enabled: bool,
    /// Resend API根地址
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API密钥
    pub api_key: Option<String>,
    /// 发件人
    pub from: Option<String>,
    /// 发送超时（秒）
    #[serde(default = "default_mail_timeout")]
    pub timeout_seconds: u64,
    /// 自定义主题模板
    pub subject_template: Option<String>,
    /// 自定义正文模板
    pub body_template: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_api_base(),
            api_key: None,
            from: None,
            timeout_seconds: default_mail_timeout(),
            subject_template: None,
            body_template: None,
        }
    }
}

impl MailConfig {
    /// 发送超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// 日志保留时长上限（小时），100年
pub const MAX_LOG_RETENTION_HOURS: u64 = 24 * 365 * 100;

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// JSON快照路径，未配置时只保存在内存中
    pub snapshot_path: Option<PathBuf>,
    /// 探测日志保留时长（小时），0 表示不清理
    #[serde(default = "default_log_retention")]
    pub log_retention_hours: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            log_retention_hours: default_log_retention(),
        }
    }
}

impl StoreConfig {
    /// 日志保留时长
    pub fn log_retention(&self) -> Option<chrono::Duration> {
        match self.log_retention_hours {
            0 => None,
            hours => i64::try_from(hours).ok().and_then(chrono::Duration::try_hours),
        }
    }
}

/// 用户配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    /// 用户ID
    pub id: String,
    /// 用户名称
    pub name: String,
    /// 邮箱
    pub email: String,
}

/// 监控目标配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// 所属用户ID
    pub user_id: String,
    /// 显示名称
    pub name: String,
    /// 监控URL
    pub url: String,
    /// 宕机时是否发送邮件
    #[serde(default = "default_true")]
    pub send_email_on_down: bool,
    /// 是否启用
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl From<&TargetConfig> for NewTarget {
    fn from(target: &TargetConfig) -> Self {
        NewTarget {
            name: target.name.clone(),
            url: target.url.clone(),
            send_email_on_down: target.send_email_on_down,
            is_active: target.is_active,
        }
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    5
}
fn default_timeout() -> u64 {
    4
}
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_CHECKS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_uptime_window() -> u32 {
    DEFAULT_WINDOW_HOURS
}
fn default_api_base() -> String {
    "https://api.resend.com".to_string()
}
fn default_mail_timeout() -> u64 {
    10
}
fn default_log_retention() -> u64 {
    168 // 7天
}
fn default_true() -> bool {
    true
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.request_timeout_seconds >= config.global.check_interval_seconds {
        return Err(format!(
            "请求超时时间({}秒)必须小于检测间隔({}秒)",
            config.global.request_timeout_seconds, config.global.check_interval_seconds
        ));
    }

    if config.global.max_concurrent_checks == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    if config.global.uptime_window_hours == 0 {
        return Err("可用率统计窗口不能为0".to_string());
    }

    if config.store.log_retention_hours > MAX_LOG_RETENTION_HOURS {
        return Err(format!(
            "日志保留时长({}小时)超出上限{}小时",
            config.store.log_retention_hours, MAX_LOG_RETENTION_HOURS
        ));
    }

    if parse_level(&config.global.log_level).is_none() {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level,
            ["off", "error", "warn", "info", "debug", "trace"]
        ));
    }

    // 验证邮件配置
    if config.mail.enabled {
        if config.mail.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err("启用邮件时必须配置 api_key".to_string());
        }
        if config.mail.from.as_deref().is_none_or(|f| f.trim().is_empty()) {
            return Err("启用邮件时必须配置发件人 from".to_string());
        }
        if !config.mail.api_base.starts_with("http://") && !config.mail.api_base.starts_with("https://") {
            return Err(format!("邮件API地址格式无效: {}", config.mail.api_base));
        }
        if config.mail.timeout_seconds == 0 {
            return Err("邮件发送超时不能为0".to_string());
        }
    }

    validate_templates(
        config.mail.subject_template.as_deref(),
        config.mail.body_template.as_deref(),
    )
    .map_err(|e| e.to_string())?;

    // 验证用户
    let mut user_ids = HashSet::new();
    for user in &config.users {
        if user.id.trim().is_empty() {
            return Err("用户ID不能为空".to_string());
        }
        if !user.email.contains('@') {
            return Err(format!("用户 {} 的邮箱格式无效: {}", user.id, user.email));
        }
        if !user_ids.insert(user.id.as_str()) {
            return Err(format!("用户ID重复: {}", user.id));
        }
    }

    // 验证监控目标
    let mut target_keys = HashSet::new();
    for target in &config.targets {
        if target.name.trim().is_empty() {
            return Err("监控目标名称不能为空".to_string());
        }

        if !user_ids.contains(target.user_id.as_str()) {
            return Err(format!(
                "监控目标 {} 引用了不存在的用户: {}",
                target.name, target.user_id
            ));
        }

        validate_target_url(&target.url).map_err(|e| format!("监控目标 {} 配置无效: {}", target.name, e))?;

        if !target_keys.insert((target.user_id.as_str(), target.url.as_str())) {
            return Err(format!(
                "用户 {} 重复配置了监控URL: {}",
                target.user_id, target.url
            ));
        }
    }

    Ok(())
}
