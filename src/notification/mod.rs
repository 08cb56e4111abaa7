//! 通知模块
//!
//! 提供告警消息组装和邮件发送功能

pub mod composer;
pub mod resend;
pub mod sender;

// 重新导出主要类型
pub use composer::{AlertComposer, AlertMessage};
pub use resend::ResendMailer;
pub use sender::{MailSender, NoOpSender};
