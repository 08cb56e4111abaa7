//! 存活状态机
//!
//! 根据探测结果和目标当前持久化的状态计算下一个状态，并决定是否需要告警。
//! 纯函数实现，不做任何IO。

use crate::probe::ProbeOutcome;
use serde::{Deserialize, Serialize};

/// 目标的存活状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessState {
    /// 正常
    Up,
    /// 宕机
    Down,
}

impl LivenessState {
    /// 由持久化的 `is_down` 标志还原状态
    pub fn from_is_down(is_down: bool) -> Self {
        if is_down {
            LivenessState::Down
        } else {
            LivenessState::Up
        }
    }

    /// 是否为宕机状态
    pub fn is_down(self) -> bool {
        matches!(self, LivenessState::Down)
    }
}

impl Default for LivenessState {
    fn default() -> Self {
        LivenessState::Up
    }
}

impl std::fmt::Display for LivenessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LivenessState::Up => write!(f, "正常"),
            LivenessState::Down => write!(f, "宕机"),
        }
    }
}

/// 状态机判定存活的状态码：`[200, 400)`
///
/// 3xx 视为存活，只看状态码不看延迟。
pub fn is_probe_success(outcome: &ProbeOutcome) -> bool {
    outcome
        .status_code()
        .is_some_and(|code| (200..400).contains(&code))
}

/// 一次状态转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// 转换前状态
    pub previous: LivenessState,
    /// 转换后状态
    pub next: LivenessState,
    /// 是否需要发送告警
    pub alert_due: bool,
}

impl Transition {
    /// 是否开启了一个新的宕机周期（Up → Down）
    pub fn entered_down_episode(&self) -> bool {
        self.previous == LivenessState::Up && self.next == LivenessState::Down
    }

    /// 是否从宕机中恢复（Down → Up）
    pub fn recovered(&self) -> bool {
        self.previous == LivenessState::Down && self.next == LivenessState::Up
    }

    /// 需要持久化的 `is_down` 值
    pub fn is_down(&self) -> bool {
        self.next.is_down()
    }
}

/// 计算状态转换
///
/// # 参数
/// * `previous_is_down` - 目标当前持久化的宕机标志
/// * `send_email_on_down` - 目标是否开启宕机邮件
/// * `outcome` - 本次探测结果
///
/// # 返回
/// * `Transition` - 新状态及告警决定；告警只在 Up → Down 的边沿触发
pub fn evaluate(previous_is_down: bool, send_email_on_down: bool, outcome: &ProbeOutcome) -> Transition {
    let previous = LivenessState::from_is_down(previous_is_down);
    let next = if is_probe_success(outcome) {
        LivenessState::Up
    } else {
        LivenessState::Down
    };

    let entered_down_episode = previous == LivenessState::Up && next == LivenessState::Down;

    Transition {
        previous,
        next,
        alert_due: entered_down_episode && send_email_on_down,
    }
}
