//! PingBot 主程序入口
//!
//! HTTP(S) 端点存活监控

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pingbot::core::app::main().await
}
