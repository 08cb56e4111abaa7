//! 邮件发送器模块
//!
//! 定义邮件发送的trait和基础实现

use crate::error::NotificationError;
use async_trait::async_trait;
use tracing::debug;

/// 邮件发送器trait
#[async_trait]
pub trait MailSender: Send + Sync {
    /// 发送一封HTML邮件
    ///
    /// # 参数
    /// * `to` - 收件人地址
    /// * `subject` - 邮件主题
    /// * `html_body` - HTML正文
    ///
    /// # 返回
    /// * `Result<(), NotificationError>` - 发送结果
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), NotificationError>;

    /// 发送器名称，用于日志
    fn name(&self) -> &'static str;
}

/// 空的邮件发送器实现（用于禁用邮件）
pub struct NoOpSender;

#[async_trait]
impl MailSender for NoOpSender {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<(), NotificationError> {
        debug!("邮件发送已禁用，跳过: {} -> {}", subject, to);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
