// ==========================================
// 表格数据导入管道 - 记录存储 Trait
// ==========================================
// 职责: 远端记录存储边界（insert / upsert / 按组织清空）与导入运行日志
// 红线: Repository 不含业务规则，只做数据读写
// ==========================================

use crate::domain::ImportRun;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 发往存储的一条记录（JSON 对象）
pub type StoreRecord = serde_json::Map<String, serde_json::Value>;

/// 记录中组织 ID 的键名
pub const ORGANIZATION_KEY: &str = "organization_id";

/// 单次写入结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub inserted: usize,
    pub updated: usize,
}

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 批次写入
// 实现者: SqliteRecordStore，或宿主注入的远端客户端
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 普通插入
    ///
    /// # 返回
    /// - Ok(WriteOutcome): inserted = rows.len()
    /// - Err: 整次写入失败（不产生部分写入）
    async fn insert(&self, table: &str, rows: Vec<StoreRecord>) -> RepositoryResult<WriteOutcome>;

    /// 按冲突键插入或更新
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<StoreRecord>,
        conflict_key: &str,
    ) -> RepositoryResult<WriteOutcome>;

    /// 删除某组织在该表中的全部记录（replace 策略）
    async fn delete_all(&self, table: &str, organization_id: &str) -> RepositoryResult<usize>;
}

// ==========================================
// ImportRunLog Trait
// ==========================================
// 用途: 导入运行历史
// 实现者: SqliteRecordStore
#[async_trait]
pub trait ImportRunLog: Send + Sync {
    async fn record_run(&self, run: &ImportRun) -> RepositoryResult<()>;

    /// 最近的运行记录（按开始时间倒序）
    async fn recent_runs(&self, entity: Option<&str>, limit: usize)
        -> RepositoryResult<Vec<ImportRun>>;
}
