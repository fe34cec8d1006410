// ==========================================
// 表格数据导入管道 - SQLite 记录存储实现
// ==========================================
// 存储: import_record（payload 为 JSON）/ import_run
// 约定: 每次 insert / upsert 调用为一个事务，全成或全不成
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::{ImportRun, ImportStrategy, RunStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{
    ImportRunLog, RecordStore, StoreRecord, WriteOutcome, ORGANIZATION_KEY,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 冲突键值的字符串形式（Null / 缺失为 None）
fn key_value(record: &StoreRecord, key: &str) -> Option<String> {
    match record.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn organization_of(record: &StoreRecord) -> String {
    key_value(record, ORGANIZATION_KEY).unwrap_or_default()
}

fn parse_timestamp(field: &str, raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::FieldValueError {
            field: field.to_string(),
            message: e.to_string(),
        })
}

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    /// 表 → 记录键字段；普通插入也写入 record_key，供后续 update 查找
    key_fields: Mutex<HashMap<String, String>>,
}

impl SqliteRecordStore {
    /// 创建新的存储实例（建表幂等）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// 内存数据库（测试 / 预演）
    pub fn in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> RepositoryResult<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key_fields: Mutex::new(HashMap::new()),
        })
    }

    /// 登记表的记录键字段（不做唯一约束，文件内重复由校验给出 warning）
    pub fn register_key(&self, table: &str, key_field: &str) -> RepositoryResult<()> {
        let mut keys = self.key_fields.lock()?;
        keys.insert(table.to_string(), key_field.to_string());
        Ok(())
    }

    fn registered_key(&self, table: &str) -> RepositoryResult<Option<String>> {
        let keys = self.key_fields.lock()?;
        Ok(keys.get(table).cloned())
    }

    fn insert_tx(
        tx: &Transaction,
        table: &str,
        record: &StoreRecord,
        record_key: Option<&str>,
        now: &str,
    ) -> RepositoryResult<()> {
        let payload = serde_json::to_string(record)?;
        tx.execute(
            r#"
            INSERT INTO import_record (
                entity, organization_id, record_key, payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![table, organization_of(record), record_key, payload, now],
        )?;
        Ok(())
    }

    /// 记录数
    pub fn count(&self, table: &str, organization_id: &str) -> RepositoryResult<usize> {
        let conn = self.conn.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_record WHERE entity = ?1 AND organization_id = ?2",
            params![table, organization_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// 按写入顺序读取全部记录
    pub fn fetch_all(&self, table: &str, organization_id: &str) -> RepositoryResult<Vec<StoreRecord>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM import_record WHERE entity = ?1 AND organization_id = ?2 ORDER BY record_id",
        )?;
        let rows = stmt.query_map(params![table, organization_id], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for payload in rows {
            let value: Value = serde_json::from_str(&payload?)?;
            if let Value::Object(map) = value {
                records.push(map);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, table: &str, rows: Vec<StoreRecord>) -> RepositoryResult<WriteOutcome> {
        let key_field = self.registered_key(table)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        for record in &rows {
            let record_key = key_field.as_deref().and_then(|k| key_value(record, k));
            Self::insert_tx(&tx, table, record, record_key.as_deref(), &now)?;
        }
        tx.commit()?;

        debug!(table, rows = rows.len(), "insert 完成");
        Ok(WriteOutcome {
            inserted: rows.len(),
            updated: 0,
        })
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<StoreRecord>,
        conflict_key: &str,
    ) -> RepositoryResult<WriteOutcome> {
        let now = Utc::now().to_rfc3339();
        let mut outcome = WriteOutcome::default();

        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        for record in &rows {
            let organization_id = organization_of(record);
            let Some(record_key) = key_value(record, conflict_key) else {
                Self::insert_tx(&tx, table, record, None, &now)?;
                outcome.inserted += 1;
                continue;
            };

            // 同键的多条记录一并更新
            let payload = serde_json::to_string(record)?;
            let changed = tx.execute(
                r#"
                UPDATE import_record SET payload = ?1, updated_at = ?2
                WHERE entity = ?3 AND organization_id = ?4 AND record_key = ?5
                "#,
                params![payload, now, table, organization_id, record_key],
            )?;

            if changed > 0 {
                outcome.updated += 1;
            } else {
                Self::insert_tx(&tx, table, record, Some(&record_key), &now)?;
                outcome.inserted += 1;
            }
        }
        tx.commit()?;

        debug!(table, inserted = outcome.inserted, updated = outcome.updated, "upsert 完成");
        Ok(outcome)
    }

    async fn delete_all(&self, table: &str, organization_id: &str) -> RepositoryResult<usize> {
        let conn = self.conn.lock()?;
        let deleted = conn.execute(
            "DELETE FROM import_record WHERE entity = ?1 AND organization_id = ?2",
            params![table, organization_id],
        )?;
        debug!(table, organization_id, deleted, "delete_all 完成");
        Ok(deleted)
    }
}

#[async_trait]
impl ImportRunLog for SqliteRecordStore {
    async fn record_run(&self, run: &ImportRun) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_run (
                run_id, entity, mode, organization_id, total_rows, imported, updated,
                batches_ok, status, error, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                run.run_id,
                run.entity,
                run.mode.to_string(),
                run.organization_id,
                run.total_rows as i64,
                run.imported as i64,
                run.updated as i64,
                run.batches_ok as i64,
                run.status.as_str(),
                run.error,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn recent_runs(
        &self,
        entity: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportRun>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, entity, mode, organization_id, total_rows, imported, updated,
                   batches_ok, status, error, started_at, finished_at
            FROM import_run
            WHERE (?1 IS NULL OR entity = ?1)
            ORDER BY started_at DESC
            LIMIT ?2
            "#,
        )?;

        type RunRow = (
            String,
            String,
            String,
            String,
            i64,
            i64,
            i64,
            i64,
            String,
            Option<String>,
            String,
            String,
        );
        let rows = stmt.query_map(params![entity, limit as i64], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let r: RunRow = row?;
            runs.push(ImportRun {
                run_id: r.0,
                entity: r.1,
                mode: r.2.parse::<ImportStrategy>().unwrap_or_default(),
                organization_id: r.3,
                total_rows: r.4 as usize,
                imported: r.5 as usize,
                updated: r.6 as usize,
                batches_ok: r.7 as usize,
                status: RunStatus::parse(&r.8),
                error: r.9,
                started_at: parse_timestamp("started_at", &r.10)?,
                finished_at: parse_timestamp("finished_at", &r.11)?,
            });
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(org: &str, sku: &str, price: f64) -> StoreRecord {
        match json!({ "organization_id": org, "sku": sku, "unit_price": price }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let store = SqliteRecordStore::in_memory().unwrap();
        let outcome = store
            .insert("products", vec![record("org1", "A1", 1.0), record("org1", "A2", 2.0)])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(store.count("products", "org1").unwrap(), 2);
        assert_eq!(store.count("products", "org2").unwrap(), 0);

        let records = store.fetch_all("products", "org1").unwrap();
        assert_eq!(records[1]["sku"], json!("A2"));
    }

    #[tokio::test]
    async fn test_registered_key_allows_duplicates_and_update_finds_them() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store.register_key("products", "sku").unwrap();
        store
            .insert("products", vec![record("org1", "A1", 1.0), record("org1", "A1", 3.0)])
            .await
            .unwrap();
        assert_eq!(store.count("products", "org1").unwrap(), 2);

        let outcome = store
            .upsert("products", vec![record("org1", "A1", 7.5)], "sku")
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome { inserted: 0, updated: 1 });
        let records = store.fetch_all("products", "org1").unwrap();
        assert!(records.iter().all(|r| r["unit_price"] == json!(7.5)));
    }

    #[tokio::test]
    async fn test_insert_is_atomic_when_a_row_fails() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store.register_key("products", "sku").unwrap();
        store.insert("products", vec![record("org1", "A1", 1.0)]).await.unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_bad_sku BEFORE INSERT ON import_record \
                 WHEN NEW.record_key = 'BAD' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = store
            .insert("products", vec![record("org1", "A2", 2.0), record("org1", "BAD", 3.0)])
            .await;
        assert!(result.is_err());
        // 事务回滚：A2 也未写入
        assert_eq!(store.count("products", "org1").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_counts_inserted_and_updated() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store
            .upsert("products", vec![record("org1", "A1", 1.0)], "sku")
            .await
            .unwrap();
        let outcome = store
            .upsert(
                "products",
                vec![record("org1", "A1", 9.0), record("org1", "B1", 2.0)],
                "sku",
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome { inserted: 1, updated: 1 });

        let records = store.fetch_all("products", "org1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["unit_price"], json!(9.0));
    }

    #[tokio::test]
    async fn test_delete_all_scoped_to_organization() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store
            .insert("products", vec![record("org1", "A1", 1.0), record("org2", "A1", 1.0)])
            .await
            .unwrap();
        assert_eq!(store.delete_all("products", "org1").await.unwrap(), 1);
        assert_eq!(store.count("products", "org2").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_log_roundtrip_and_ordering() {
        let store = SqliteRecordStore::in_memory().unwrap();
        let started = Utc::now();
        for (i, status) in [RunStatus::Completed, RunStatus::Failed].iter().enumerate() {
            store
                .record_run(&ImportRun {
                    run_id: format!("run-{}", i),
                    entity: "products".into(),
                    mode: ImportStrategy::Update,
                    organization_id: "org1".into(),
                    total_rows: 10,
                    imported: 5,
                    updated: 5,
                    batches_ok: 1,
                    status: *status,
                    error: None,
                    started_at: started + chrono::Duration::seconds(i as i64),
                    finished_at: started + chrono::Duration::seconds(i as i64 + 1),
                })
                .await
                .unwrap();
        }

        let runs = store.recent_runs(Some("products"), 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "run-1");
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[1].mode, ImportStrategy::Update);
        assert!(store.recent_runs(Some("shipments"), 10).await.unwrap().is_empty());
        assert_eq!(store.recent_runs(None, 1).await.unwrap().len(), 1);
    }
}
