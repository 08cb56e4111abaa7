//! Resend 邮件发送器
//!
//! 通过 Resend HTTP API 发送告警邮件

use crate::error::NotificationError;
use crate::notification::sender::MailSender;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Resend 发信接口的请求体
#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Resend 邮件发送器
pub struct ResendMailer {
    /// HTTP客户端
    client: Client,
    /// API根地址
    api_base: String,
    /// API密钥
    api_key: String,
    /// 发件人
    from: String,
}

impl ResendMailer {
    /// 创建新的 Resend 发送器
    ///
    /// # 参数
    /// * `api_base` - API根地址，例如 `https://api.resend.com`
    /// * `api_key` - API密钥
    /// * `from` - 发件人
    /// * `timeout` - 单次请求超时
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 发送器实例
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::ConfigError(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
        })
    }

    fn emails_endpoint(&self) -> String {
        format!("{}/emails", self.api_base)
    }
}

#[async_trait]
impl MailSender for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), NotificationError> {
        let endpoint = self.emails_endpoint();
        debug!("发送告警邮件到 {}: {}", to, endpoint);

        let request = SendEmailRequest {
            from: &self.from,
            to: [to],
            subject,
            html: html_body,
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotificationError::SendError(format!("请求Resend失败: {e}")))?;

        if response.status().is_success() {
            info!("告警邮件发送成功: {}", to);
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("告警邮件发送失败: {} - {}", status, text);
            Err(NotificationError::SendError(format!(
                "Resend返回错误状态 {status}: {text}"
            )))
        }
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}
