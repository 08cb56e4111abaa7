//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::store::TargetId;
use thiserror::Error;

/// PingBot 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum PingBotError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 持久化相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 监控周期相关错误
    #[error("监控错误: {0}")]
    Monitor(#[from] MonitorError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 持久化错误类型
///
/// 存储写入失败时由监控周期记录并上报，不会中断同一周期内其他目标的处理。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 目标不存在
    #[error("监控目标不存在: {id}")]
    TargetNotFound { id: TargetId },

    /// 用户不存在
    #[error("用户不存在: {id}")]
    UserNotFound { id: String },

    /// 同一用户下URL重复
    #[error("用户 {user_id} 已存在相同的监控URL: {url}")]
    DuplicateTarget { user_id: String, url: String },

    /// 无效的监控URL
    #[error("无效的监控URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// 快照读写失败
    #[error("快照读写失败: {0}")]
    Snapshot(String),

    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 监控周期错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 上一个监控周期尚未结束
    #[error("上一个监控周期仍在运行")]
    TickInProgress,

    /// 加载监控目标失败
    #[error("加载监控目标失败: {0}")]
    LoadTargets(#[source] StoreError),

    /// 调度器状态错误
    #[error("调度器状态错误: {0}")]
    Scheduler(String),
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, PingBotError>;

/// 存储操作结果类型别名
pub type StoreResult<T> = std::result::Result<T, StoreError>;
