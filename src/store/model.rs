//! 存储数据模型
//!
//! 定义用户、监控目标、探测日志和告警记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 监控目标ID
pub type TargetId = i64;

/// 用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// 用户ID
    pub id: String,
    /// 用户名称
    pub name: String,
    /// 邮箱地址
    pub email: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 监控目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// 目标ID
    pub id: TargetId,
    /// 所属用户ID
    pub user_id: String,
    /// 显示名称
    pub name: String,
    /// 监控URL
    pub url: String,
    /// 宕机时是否发送邮件
    pub send_email_on_down: bool,
    /// 是否参与探测
    pub is_active: bool,
    /// 当前是否宕机
    pub is_down: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 新建监控目标的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTarget {
    /// 显示名称
    pub name: String,
    /// 监控URL
    pub url: String,
    /// 宕机时是否发送邮件
    pub send_email_on_down: bool,
    /// 是否参与探测
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

/// 探测日志，一次探测对应一条，写入后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeLog {
    /// 日志ID
    pub id: u64,
    /// 目标ID
    pub target_id: TargetId,
    /// HTTP状态码，传输层失败时为 0
    pub status_code: u16,
    /// 响应延迟（毫秒）
    pub latency_ms: u64,
    /// 探测时间
    pub created_at: DateTime<Utc>,
}

/// 告警记录
///
/// 目标被删除后 `target_id` 置空，记录本身保留。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 记录ID
    pub id: uuid::Uuid,
    /// 目标ID
    pub target_id: Option<TargetId>,
    /// 用户ID
    pub user_id: String,
    /// 邮件主题
    pub subject: String,
    /// 邮件正文
    pub body: String,
    /// 发送时间
    pub created_at: DateTime<Utc>,
}

/// 一次性读取的目标状态与日志窗口
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetWindow {
    /// 目标当前状态
    pub target: Target,
    /// 窗口内按时间排序的日志
    pub logs: Vec<ProbeLog>,
}
