//! HTTP存活探测器实现
//!
//! 对目标URL发起一次 HEAD 请求并记录状态码与延迟，
//! 所有传输层错误都转换为 [`ProbeOutcome::TransportFailure`]

use crate::error::{PingBotError, Result};
use crate::probe::outcome::{ProbeOutcome, TransportErrorKind};
use async_trait::async_trait;
use reqwest::{redirect, Client};
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// 存活探测器trait
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// 对URL执行一次探测
    ///
    /// 该方法不会失败：网络错误以 [`ProbeOutcome::TransportFailure`] 返回。
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// 基于 reqwest 的 HEAD 探测器
#[derive(Debug, Clone)]
pub struct HttpProbeExecutor {
    /// HTTP客户端
    client: Client,
    /// 单次探测超时时间
    timeout: Duration,
}

impl HttpProbeExecutor {
    /// 创建新的探测器
    ///
    /// # 参数
    /// * `timeout` - 单次探测超时时间，必须为有限值
    ///
    /// # 返回
    /// * `Result<Self>` - 探测器实例
    pub fn new(timeout: Duration) -> Result<Self> {
        // 不跟随重定向：3xx 按原样上报，由状态机视为存活
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| PingBotError::Other(anyhow::anyhow!("创建HTTP客户端失败: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// 探测超时时间
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 把 reqwest 错误归类为传输层失败类别
    fn classify_error(error: &reqwest::Error) -> TransportErrorKind {
        if error.is_timeout() {
            return TransportErrorKind::Timeout;
        }
        if error.is_builder() {
            return TransportErrorKind::InvalidUrl;
        }

        let chain = error_chain(error).to_lowercase();
        if chain.contains("dns") || chain.contains("failed to lookup") || chain.contains("name or service") {
            TransportErrorKind::Dns
        } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
            TransportErrorKind::Tls
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        }
    }
}

/// 拼接错误及其全部来源的描述
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

#[async_trait]
impl ProbeExecutor for HttpProbeExecutor {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start_time = Instant::now();

        let response_result = timeout(self.timeout, self.client.head(url).send()).await;
        let latency_ms = start_time.elapsed().as_millis() as u64;

        match response_result {
            Ok(Ok(response)) => ProbeOutcome::response(response.status().as_u16(), latency_ms),
            Ok(Err(e)) => ProbeOutcome::transport_failure(
                Self::classify_error(&e),
                error_chain(&e),
                latency_ms,
            ),
            Err(_) => ProbeOutcome::transport_failure(
                TransportErrorKind::Timeout,
                format!("no response within {}ms", self.timeout.as_millis()),
                latency_ms,
            ),
        }
    }
}
