//! 存储模块
//!
//! 定义监控核心依赖的数据存储接口，并提供基于内存和JSON快照的实现

pub mod memory;
pub mod model;

pub use memory::MemoryStore;
pub use model::{AlertRecord, NewTarget, ProbeLog, Target, TargetId, TargetWindow, User};

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 监控目标存储
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// 列出所有启用探测的目标
    async fn list_active_targets(&self) -> StoreResult<Vec<Target>>;

    /// 获取单个目标
    async fn get_target(&self, id: TargetId) -> StoreResult<Option<Target>>;

    /// 更新目标的宕机状态
    async fn update_down_state(&self, id: TargetId, is_down: bool) -> StoreResult<()>;

    /// 获取用户
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;

    /// 列出用户的全部目标
    async fn list_user_targets(&self, user_id: &str) -> StoreResult<Vec<Target>>;
}

/// 探测日志存储
#[async_trait]
pub trait LogStore: Send + Sync {
    /// 追加一条探测日志
    async fn append_log(
        &self,
        target_id: TargetId,
        status_code: u16,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<ProbeLog>;

    /// 查询 `[from, to]` 区间内的日志，按时间升序
    async fn query_logs(
        &self,
        target_id: TargetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<ProbeLog>>;

    /// 读取用户所有目标及其日志窗口
    ///
    /// 实现必须保证目标状态与日志来自同一个一致的快照。
    async fn target_windows(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<TargetWindow>>;

    /// 删除早于 `before` 的日志，返回删除条数
    async fn prune_logs_before(&self, before: DateTime<Utc>) -> StoreResult<usize>;
}

/// 告警记录存储
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// 追加一条告警记录
    async fn append_alert(
        &self,
        user_id: &str,
        target_id: Option<TargetId>,
        subject: &str,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<AlertRecord>;

    /// 列出用户的告警记录，按时间升序
    async fn list_alerts(&self, user_id: &str) -> StoreResult<Vec<AlertRecord>>;
}

/// 监控周期使用的完整存储接口
#[async_trait]
pub trait MonitorStore: TargetStore + LogStore + AlertStore {
    /// 提交一次探测结果：写入日志并更新宕机状态
    ///
    /// 默认实现分两步写入；支持事务的实现应覆盖此方法，
    /// 使读者不会看到日志已写入而状态未更新的中间态。
    async fn commit_probe(
        &self,
        target_id: TargetId,
        status_code: u16,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
        is_down: bool,
    ) -> StoreResult<ProbeLog> {
        let log = self
            .append_log(target_id, status_code, latency_ms, timestamp)
            .await?;
        self.update_down_state(target_id, is_down).await?;
        Ok(log)
    }

    /// 持久化检查点，每个监控周期结束后调用
    async fn checkpoint(&self) -> StoreResult<()> {
        Ok(())
    }
}
