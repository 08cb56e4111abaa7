//! 探测结果数据结构
//!
//! 定义一次存活探测的结果，传输层失败也是一种正常结果

use serde::{Deserialize, Serialize};

/// 传输层失败时写入日志的状态码
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// 传输层失败的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// 请求超时
    Timeout,
    /// 连接失败
    Connect,
    /// DNS解析失败
    Dns,
    /// TLS/证书错误
    Tls,
    /// URL无法构造请求
    InvalidUrl,
    /// 其他网络错误
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "Request timeout"),
            TransportErrorKind::Connect => write!(f, "Connection refused"),
            TransportErrorKind::Dns => write!(f, "DNS resolution failed"),
            TransportErrorKind::Tls => write!(f, "SSL/TLS certificate error"),
            TransportErrorKind::InvalidUrl => write!(f, "Invalid request"),
            TransportErrorKind::Other => write!(f, "Network error"),
        }
    }
}

/// 一次探测的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// 收到了HTTP响应（任意状态码）
    Response {
        /// HTTP状态码
        status_code: u16,
        /// 响应延迟（毫秒）
        latency_ms: u64,
    },
    /// 传输层失败：DNS、连接、超时等
    TransportFailure {
        /// 失败类别
        kind: TransportErrorKind,
        /// 原始错误描述
        message: String,
        /// 失败前经过的时间（毫秒）
        latency_ms: u64,
    },
}

impl ProbeOutcome {
    /// 构造响应结果
    pub fn response(status_code: u16, latency_ms: u64) -> Self {
        ProbeOutcome::Response {
            status_code,
            latency_ms,
        }
    }

    /// 构造传输层失败结果
    pub fn transport_failure(kind: TransportErrorKind, message: impl Into<String>, latency_ms: u64) -> Self {
        ProbeOutcome::TransportFailure {
            kind,
            message: message.into(),
            latency_ms,
        }
    }

    /// HTTP状态码，传输层失败时为 `None`
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Response { status_code, .. } => Some(*status_code),
            ProbeOutcome::TransportFailure { .. } => None,
        }
    }

    /// 写入日志的状态码，传输层失败时为 [`TRANSPORT_FAILURE_STATUS`]
    pub fn logged_status_code(&self) -> u16 {
        self.status_code().unwrap_or(TRANSPORT_FAILURE_STATUS)
    }

    /// 延迟（毫秒）
    pub fn latency_ms(&self) -> u64 {
        match self {
            ProbeOutcome::Response { latency_ms, .. }
            | ProbeOutcome::TransportFailure { latency_ms, .. } => *latency_ms,
        }
    }

    /// 人类可读的错误描述
    pub fn error_description(&self) -> Option<String> {
        match self {
            ProbeOutcome::Response { .. } => None,
            ProbeOutcome::TransportFailure { kind, message, .. } => Some(format!("{kind}: {message}")),
        }
    }
}
