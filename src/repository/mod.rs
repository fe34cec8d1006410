// ==========================================
// 表格数据导入管道 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 记录存储边界、导入运行日志、映射模板持久化
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod record_store;
pub mod record_store_impl;
pub mod template_store;

pub use error::{RepositoryError, RepositoryResult};
pub use record_store::{ImportRunLog, RecordStore, StoreRecord, WriteOutcome, ORGANIZATION_KEY};
pub use record_store_impl::SqliteRecordStore;
pub use template_store::TemplateStore;
