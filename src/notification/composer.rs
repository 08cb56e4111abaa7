//! 告警消息组装
//!
//! 使用 Handlebars 模板渲染宕机告警的邮件主题和HTML正文。
//! 主题不做转义，正文按HTML转义。

use crate::error::NotificationError;
use crate::probe::ProbeOutcome;
use crate::store::{Target, User};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;

const SUBJECT_TEMPLATE_NAME: &str = "alert_subject";
const BODY_TEMPLATE_NAME: &str = "alert_body";

/// 告警时间的显示格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// 默认邮件主题模板
pub fn default_subject_template() -> String {
    "🚨 Endpoint Down Alert: {{endpoint_name}}".to_string()
}

/// 默认邮件正文模板
pub fn default_body_template() -> String {
    r#"<p>Hello {{user_name}},</p>
<p>We detected that your monitored endpoint is currently unreachable:</p>
<p>🔗 URL: {{endpoint_url}}<br>
⏱️ Time: {{timestamp}}<br>
📄 Status: Failed (HTTP {{status_code}})</p>
{{#if error_message}}
<p>⚠️ Error: {{error_message}}</p>
{{/if}}
<p>We will continue monitoring and notify you of any further changes.</p>
<p>Regards,<br>
PingBot Team</p>"#
        .to_string()
}

/// 渲染完成的告警消息
///
/// 同一份内容既用于发送邮件，也写入告警记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    /// 邮件主题
    pub subject: String,
    /// HTML正文
    pub body: String,
}

/// 告警消息组装器
#[derive(Debug)]
pub struct AlertComposer {
    subject: Handlebars<'static>,
    body: Handlebars<'static>,
}

impl AlertComposer {
    /// 使用自定义模板创建组装器
    ///
    /// # 参数
    /// * `subject_template` - 主题模板
    /// * `body_template` - 正文模板
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 模板语法错误时返回 `TemplateError`
    pub fn new(subject_template: &str, body_template: &str) -> Result<Self, NotificationError> {
        let mut subject = Handlebars::new();
        subject.register_escape_fn(handlebars::no_escape);
        subject
            .register_template_string(SUBJECT_TEMPLATE_NAME, subject_template)
            .map_err(|e| NotificationError::TemplateError(format!("主题模板无效: {e}")))?;

        let mut body = Handlebars::new();
        body.register_template_string(BODY_TEMPLATE_NAME, body_template)
            .map_err(|e| NotificationError::TemplateError(format!("正文模板无效: {e}")))?;

        Ok(Self { subject, body })
    }

    /// 按可选的覆盖模板创建组装器，未提供的部分使用默认模板
    pub fn with_overrides(
        subject_template: Option<&str>,
        body_template: Option<&str>,
    ) -> Result<Self, NotificationError> {
        let default_subject = default_subject_template();
        let default_body = default_body_template();
        Self::new(
            subject_template.unwrap_or(&default_subject),
            body_template.unwrap_or(&default_body),
        )
    }

    /// 组装告警消息
    ///
    /// # 参数
    /// * `target` - 宕机的目标
    /// * `user` - 目标所属用户
    /// * `outcome` - 触发告警的探测结果
    /// * `timestamp` - 探测时间
    ///
    /// # 返回
    /// * `Result<AlertMessage, NotificationError>` - 主题与正文
    pub fn compose(
        &self,
        target: &Target,
        user: &User,
        outcome: &ProbeOutcome,
        timestamp: DateTime<Utc>,
    ) -> Result<AlertMessage, NotificationError> {
        let context = json!({
            "endpoint_name": target.name,
            "endpoint_url": target.url,
            "user_name": user.name,
            "timestamp": timestamp.format(TIMESTAMP_FORMAT).to_string(),
            "status_code": outcome.logged_status_code(),
            "latency_ms": outcome.latency_ms(),
            "error_message": outcome.error_description(),
        });

        let subject = self
            .subject
            .render(SUBJECT_TEMPLATE_NAME, &context)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        let body = self
            .body
            .render(BODY_TEMPLATE_NAME, &context)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;

        Ok(AlertMessage { subject, body })
    }
}

/// 校验模板语法
pub fn validate_templates(subject_template: Option<&str>, body_template: Option<&str>) -> Result<(), NotificationError> {
    AlertComposer::with_overrides(subject_template, body_template).map(|_| ())
}
