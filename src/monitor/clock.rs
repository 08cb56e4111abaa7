//! 时钟与节拍抽象
//!
//! 监控周期通过注入的时钟取时间戳、通过节拍器等待下一个周期，
//! 测试中可以替换为手动推进的实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// 时钟trait
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 当前时间
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 以给定时间创建
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 向前推进时间
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// 直接设置时间
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 节拍器trait
#[async_trait]
pub trait Ticker: Send {
    /// 等待下一个节拍，返回 `false` 表示节拍源已结束
    async fn tick(&mut self) -> bool;
}

/// 基于 tokio 定时器的固定间隔节拍器
///
/// 错过的节拍直接跳过，不会在周期结束后连续补发。
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// 创建固定间隔节拍器，第一个节拍立即到达
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// 由通道驱动的节拍器，每收到一条消息产生一个节拍
#[derive(Debug)]
pub struct ChannelTicker {
    receiver: mpsc::Receiver<()>,
}

impl ChannelTicker {
    /// 创建节拍器及其触发端
    pub fn new(buffer: usize) -> (mpsc::Sender<()>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }
}
