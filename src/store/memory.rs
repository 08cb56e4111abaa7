//! 内存存储实现
//!
//! 所有数据保存在一把读写锁之下，读操作天然获得一致快照；
//! 可选地在每个监控周期结束后把全部状态写入JSON快照文件。

use crate::error::{StoreError, StoreResult};
use crate::monitor::clock::{Clock, SystemClock};
use crate::store::model::{AlertRecord, NewTarget, ProbeLog, Target, TargetId, TargetWindow, User};
use crate::store::{AlertStore, LogStore, MonitorStore, TargetStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 存储的全部状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    users: BTreeMap<String, User>,
    #[serde(default)]
    targets: BTreeMap<TargetId, Target>,
    #[serde(default)]
    logs: BTreeMap<TargetId, Vec<ProbeLog>>,
    #[serde(default)]
    alerts: Vec<AlertRecord>,
    #[serde(default)]
    next_target_id: TargetId,
    #[serde(default)]
    next_log_id: u64,
}

impl StoreState {
    fn insert_log(
        &mut self,
        target_id: TargetId,
        status_code: u16,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<ProbeLog> {
        if !self.targets.contains_key(&target_id) {
            return Err(StoreError::TargetNotFound { id: target_id });
        }

        self.next_log_id += 1;
        let log = ProbeLog {
            id: self.next_log_id,
            target_id,
            status_code,
            latency_ms,
            created_at: timestamp,
        };

        // 保持按时间有序，时间相同的日志按写入顺序排列
        let logs = self.logs.entry(target_id).or_default();
        let position = logs.partition_point(|existing| existing.created_at <= timestamp);
        logs.insert(position, log.clone());

        Ok(log)
    }

    fn set_down(&mut self, target_id: TargetId, is_down: bool) -> StoreResult<()> {
        let target = self
            .targets
            .get_mut(&target_id)
            .ok_or(StoreError::TargetNotFound { id: target_id })?;
        target.is_down = is_down;
        Ok(())
    }

    fn window(&self, target_id: TargetId, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<ProbeLog> {
        self.logs
            .get(&target_id)
            .map(|logs| {
                logs.iter()
                    .filter(|log| log.created_at >= from && log.created_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn owned_target_mut(&mut self, user_id: &str, target_id: TargetId) -> StoreResult<&mut Target> {
        self.targets
            .get_mut(&target_id)
            .filter(|target| target.user_id == user_id)
            .ok_or(StoreError::TargetNotFound { id: target_id })
    }
}

/// 内存存储
#[derive(Debug)]
pub struct MemoryStore {
    /// 全部状态
    state: RwLock<StoreState>,
    /// 快照文件路径
    snapshot_path: Option<PathBuf>,
    /// 新建记录的时间来源
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// 创建空的内存存储（不落盘）
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot_path: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// 使用指定时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 存储时钟的当前时间
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 打开带快照文件的存储，文件存在时载入其内容
    pub async fn open(snapshot_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let snapshot_path = snapshot_path.into();
        let state = if snapshot_path.exists() {
            let state = Self::load_snapshot(&snapshot_path).await?;
            info!(
                "已载入存储快照: {} (目标 {} 个)",
                snapshot_path.display(),
                state.targets.len()
            );
            state
        } else {
            debug!("快照文件不存在，使用空存储: {}", snapshot_path.display());
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(snapshot_path),
            clock: Arc::new(SystemClock),
        })
    }

    async fn load_snapshot(path: &Path) -> StoreResult<StoreState> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Snapshot(format!("读取快照失败: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Snapshot(format!("解析快照失败: {e}")))
    }

    /// 把当前状态写入快照文件
    ///
    /// 先写临时文件再重命名，避免进程中断留下半个文件。
    pub async fn save_snapshot(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let json_data = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| StoreError::Snapshot(format!("序列化快照失败: {e}")))?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Snapshot(format!("创建快照目录失败: {e}")))?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json_data)
            .await
            .map_err(|e| StoreError::Snapshot(format!("写入快照失败: {e}")))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| StoreError::Snapshot(format!("替换快照失败: {e}")))?;

        Ok(())
    }

    /// 新增或更新用户
    pub async fn upsert_user(&self, user: User) {
        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user);
    }

    /// 创建监控目标
    ///
    /// URL 必须是 http/https 且不能指向本机；同一用户下 URL 唯一。
    pub async fn create_target(&self, user_id: &str, new_target: NewTarget) -> StoreResult<Target> {
        validate_target_url(&new_target.url)?;

        let mut state = self.state.write().await;

        if !state.users.contains_key(user_id) {
            return Err(StoreError::UserNotFound {
                id: user_id.to_string(),
            });
        }

        let duplicate = state
            .targets
            .values()
            .any(|target| target.user_id == user_id && target.url == new_target.url);
        if duplicate {
            return Err(StoreError::DuplicateTarget {
                user_id: user_id.to_string(),
                url: new_target.url,
            });
        }

        state.next_target_id += 1;
        let target = Target {
            id: state.next_target_id,
            user_id: user_id.to_string(),
            name: new_target.name,
            url: new_target.url,
            send_email_on_down: new_target.send_email_on_down,
            is_active: new_target.is_active,
            is_down: false,
            created_at: self.clock.now(),
        };
        state.targets.insert(target.id, target.clone());

        info!("创建监控目标: {} ({})", target.name, target.url);
        Ok(target)
    }

    /// 查找用户下指定URL的目标
    pub async fn find_target_by_url(&self, user_id: &str, url: &str) -> Option<Target> {
        let state = self.state.read().await;
        state
            .targets
            .values()
            .find(|target| target.user_id == user_id && target.url == url)
            .cloned()
    }

    /// 切换目标的启用状态，返回切换后的值
    pub async fn toggle_target_active(&self, user_id: &str, target_id: TargetId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let target = state.owned_target_mut(user_id, target_id)?;
        target.is_active = !target.is_active;
        Ok(target.is_active)
    }

    /// 切换目标的邮件告警开关，返回切换后的值
    pub async fn toggle_send_email(&self, user_id: &str, target_id: TargetId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let target = state.owned_target_mut(user_id, target_id)?;
        target.send_email_on_down = !target.send_email_on_down;
        Ok(target.send_email_on_down)
    }

    /// 删除目标：级联删除日志，告警记录保留但解除关联
    pub async fn delete_target(&self, user_id: &str, target_id: TargetId) -> StoreResult<Target> {
        let mut state = self.state.write().await;
        state.owned_target_mut(user_id, target_id)?;

        let removed = state
            .targets
            .remove(&target_id)
            .ok_or(StoreError::TargetNotFound { id: target_id })?;
        state.logs.remove(&target_id);
        for alert in state
            .alerts
            .iter_mut()
            .filter(|alert| alert.target_id == Some(target_id))
        {
            alert.target_id = None;
        }

        info!("删除监控目标: {} ({})", removed.name, removed.url);
        Ok(removed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 校验监控URL
pub fn validate_target_url(url: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("仅支持 http:// 或 https://"));
    }

    let host = parsed.host_str().ok_or_else(|| invalid("缺少主机名"))?;
    if host.starts_with("127.") || host.starts_with("localhost") {
        return Err(invalid("不允许监控本机地址"));
    }

    Ok(())
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_active_targets(&self) -> StoreResult<Vec<Target>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .values()
            .filter(|target| target.is_active)
            .cloned()
            .collect())
    }

    async fn get_target(&self, id: TargetId) -> StoreResult<Option<Target>> {
        let state = self.state.read().await;
        Ok(state.targets.get(&id).cloned())
    }

    async fn update_down_state(&self, id: TargetId, is_down: bool) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.set_down(id, is_down)
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(id).cloned())
    }

    async fn list_user_targets(&self, user_id: &str) -> StoreResult<Vec<Target>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .values()
            .filter(|target| target.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn append_log(
        &self,
        target_id: TargetId,
        status_code: u16,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<ProbeLog> {
        let mut state = self.state.write().await;
        state.insert_log(target_id, status_code, latency_ms, timestamp)
    }

    async fn query_logs(
        &self,
        target_id: TargetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<ProbeLog>> {
        let state = self.state.read().await;
        Ok(state.window(target_id, from, to))
    }

    async fn target_windows(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<TargetWindow>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .values()
            .filter(|target| target.user_id == user_id)
            .map(|target| TargetWindow {
                target: target.clone(),
                logs: state.window(target.id, from, to),
            })
            .collect())
    }

    async fn prune_logs_before(&self, before: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for logs in state.logs.values_mut() {
            let cut = logs.partition_point(|log| log.created_at < before);
            logs.drain(..cut);
            removed += cut;
        }
        Ok(removed)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn append_alert(
        &self,
        user_id: &str,
        target_id: Option<TargetId>,
        subject: &str,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<AlertRecord> {
        let mut state = self.state.write().await;
        let record = AlertRecord {
            id: uuid::Uuid::new_v4(),
            target_id,
            user_id: user_id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: timestamp,
        };
        state.alerts.push(record.clone());
        Ok(record)
    }

    async fn list_alerts(&self, user_id: &str) -> StoreResult<Vec<AlertRecord>> {
        let state = self.state.read().await;
        let mut alerts: Vec<AlertRecord> = state
            .alerts
            .iter()
            .filter(|alert| alert.user_id == user_id)
            .cloned()
            .collect();
        alerts.sort_by_key(|alert| alert.created_at);
        Ok(alerts)
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn commit_probe(
        &self,
        target_id: TargetId,
        status_code: u16,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
        is_down: bool,
    ) -> StoreResult<ProbeLog> {
        let mut state = self.state.write().await;
        // 先校验目标存在，保证两步写入要么都成功要么都不发生
        if !state.targets.contains_key(&target_id) {
            return Err(StoreError::TargetNotFound { id: target_id });
        }
        let log = state.insert_log(target_id, status_code, latency_ms, timestamp)?;
        state.set_down(target_id, is_down)?;
        Ok(log)
    }

    async fn checkpoint(&self) -> StoreResult<()> {
        self.save_snapshot().await
    }
}
