// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、测试文件、协作者测试替身
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tabular_import::domain::NotifyLevel;
use tabular_import::repository::{
    RecordStore, RepositoryError, RepositoryResult, SqliteRecordStore, StoreRecord, WriteOutcome,
};
use tabular_import::wizard::{Notifier, PipelineServices, StaticIdentity};
use tempfile::{NamedTempFile, TempDir};

pub const ORG: &str = "org-test";
pub const USER: &str = "user-test";

/// 创建临时测试数据库（建表由存储完成）
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - Arc<SqliteRecordStore>: 存储实例
pub fn create_test_store() -> (NamedTempFile, Arc<SqliteRecordStore>) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let store = SqliteRecordStore::new(&db_path).unwrap();
    (temp_file, Arc::new(store))
}

/// 在临时目录中写入测试文件
pub fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// 标准依赖：SQLite 存储 + 运行日志 + 固定身份
pub fn services(store: Arc<SqliteRecordStore>) -> PipelineServices {
    PipelineServices::new(store.clone(), Arc::new(StaticIdentity::new(USER, ORG)))
        .with_run_log(store)
}

/// 生成 products CSV（分号分隔，意大利语表头）
pub fn products_csv(rows: usize) -> String {
    let mut csv = String::from("Cod.Art;Descrizione;Prezzo;Quantità\n");
    for i in 1..=rows {
        csv.push_str(&format!("ART-{:04};Articolo {};{},50 €;{}\n", i, i, i, i * 10));
    }
    csv
}

// ==========================================
// RecordingNotifier - 记录通知
// ==========================================
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(NotifyLevel, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(NotifyLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self, level: NotifyLevel) -> usize {
        self.messages().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel) {
        self.messages.lock().unwrap().push((level, message.to_string()));
    }
}

// ==========================================
// FlakyStore - 在第 N 次写入时失败，其余委托给 SQLite
// ==========================================
pub struct FlakyStore {
    inner: Arc<SqliteRecordStore>,
    fail_on_write: usize,
    writes: Mutex<usize>,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteRecordStore>, fail_on_write: usize) -> Self {
        Self {
            inner,
            fail_on_write,
            writes: Mutex::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    fn tick(&self) -> RepositoryResult<()> {
        let mut writes = self.writes.lock().unwrap();
        *writes += 1;
        if *writes == self.fail_on_write {
            return Err(RepositoryError::DatabaseQueryError(
                "remote store: request timed out".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert(&self, table: &str, rows: Vec<StoreRecord>) -> RepositoryResult<WriteOutcome> {
        self.tick()?;
        self.inner.insert(table, rows).await
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<StoreRecord>,
        conflict_key: &str,
    ) -> RepositoryResult<WriteOutcome> {
        self.tick()?;
        self.inner.upsert(table, rows, conflict_key).await
    }

    async fn delete_all(&self, table: &str, organization_id: &str) -> RepositoryResult<usize> {
        self.inner.delete_all(table, organization_id).await
    }
}
