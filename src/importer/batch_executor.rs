// ==========================================
// 表格数据导入管道 - 批次入库执行器
// ==========================================
// 规则:
// - 行按原顺序切分为固定大小的连续批次
// - 批次严格串行：上一批写入完成后才提交下一批
// - 任一批次失败即中止，之前的批次保持已提交，不回滚
// - 策略决定写入方式：append=insert / replace=先清空再 insert / update=upsert
// ==========================================

use crate::domain::{BatchResult, CoercedRow, Identity, ImportProgress, ImportStrategy, TypedValue};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::{RecordStore, StoreRecord, ORGANIZATION_KEY};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// 默认批次大小
pub const DEFAULT_BATCH_SIZE: usize = 100;

pub const CREATED_BY_KEY: &str = "created_by";
pub const RUN_ID_KEY: &str = "import_run_id";
pub const CUSTOM_FIELDS_KEY: &str = "custom_fields";

/// 批次失败后的重试策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// 不重试：首个失败批次即中止
    #[default]
    None,
}

/// 一次执行的上下文（目标表 + 身份 + 运行 ID）
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub entity: String,
    pub identity: Identity,
    pub run_id: String,
}

/// 全部批次成功后的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub total_rows: usize,
    pub imported: usize,
    pub updated: usize,
    pub batches: Vec<BatchResult>,
    pub progress: ImportProgress,
}

fn json_value(value: &TypedValue) -> Value {
    match value {
        TypedValue::Null => Value::Null,
        TypedValue::Bool(b) => Value::Bool(*b),
        TypedValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        TypedValue::Text(s) => Value::String(s.clone()),
    }
}

/// 转换行 → 存储记录，附加组织 / 创建人 / 运行 ID
pub fn to_store_record(row: &CoercedRow, ctx: &ExecutionContext) -> StoreRecord {
    let mut record = StoreRecord::new();
    for (field, value) in &row.values {
        record.insert(field.clone(), json_value(value));
    }
    if !row.custom_fields.is_empty() {
        let custom = row
            .custom_fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        record.insert(CUSTOM_FIELDS_KEY.to_string(), Value::Object(custom));
    }
    record.insert(
        ORGANIZATION_KEY.to_string(),
        Value::String(ctx.identity.organization_id.clone()),
    );
    record.insert(
        CREATED_BY_KEY.to_string(),
        Value::String(ctx.identity.user_id.clone()),
    );
    record.insert(RUN_ID_KEY.to_string(), Value::String(ctx.run_id.clone()));
    record
}

struct RunState {
    batches: VecDeque<Vec<StoreRecord>>,
    next_index: usize,
    committed: usize,
    pending_clear: bool,
    pending_error: Option<ImportError>,
    halted: bool,
}

// ==========================================
// BatchExecutor
// ==========================================
#[derive(Clone)]
pub struct BatchExecutor {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    retry: RetryPolicy,
    conflict_key: Option<String>,
}

impl BatchExecutor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::None,
            conflict_key: None,
        }
    }

    /// 批次大小（0 视为 1）
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_conflict_key(mut self, key: Option<String>) -> Self {
        self.conflict_key = key;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 批次数 = ceil(rows / batch_size)
    pub fn batch_count(&self, rows: usize) -> usize {
        rows.div_ceil(self.batch_size)
    }

    fn preflight(&self, strategy: ImportStrategy, ctx: &ExecutionContext) -> ImportResult<()> {
        if ctx.identity.organization_id.trim().is_empty() || ctx.identity.user_id.trim().is_empty()
        {
            return Err(ImportError::ConfigurationError(
                "缺少组织或用户身份，无法导入".to_string(),
            ));
        }
        if strategy == ImportStrategy::Update && self.conflict_key.is_none() {
            return Err(ImportError::ConfigurationError(
                "update 策略需要配置 conflict_key".to_string(),
            ));
        }
        Ok(())
    }

    /// 按批次产出结果的流
    ///
    /// 每次轮询只提交一个批次；出现 Err 后流结束
    pub fn execute_stream(
        &self,
        rows: &[CoercedRow],
        strategy: ImportStrategy,
        ctx: &ExecutionContext,
    ) -> impl Stream<Item = ImportResult<BatchResult>> + Send + 'static {
        let pending_error = self.preflight(strategy, ctx).err();

        let mut batches = VecDeque::with_capacity(self.batch_count(rows.len()));
        if pending_error.is_none() {
            for chunk in rows.chunks(self.batch_size) {
                batches.push_back(chunk.iter().map(|r| to_store_record(r, ctx)).collect());
            }
        }

        let state = RunState {
            batches,
            next_index: 1,
            committed: 0,
            pending_clear: strategy == ImportStrategy::Replace,
            pending_error,
            halted: false,
        };

        let store = Arc::clone(&self.store);
        let entity = ctx.entity.clone();
        let organization_id = ctx.identity.organization_id.clone();
        let conflict_key = self.conflict_key.clone().unwrap_or_default();
        let retry = self.retry;

        stream::unfold(state, move |mut state| {
            let store = Arc::clone(&store);
            let entity = entity.clone();
            let organization_id = organization_id.clone();
            let conflict_key = conflict_key.clone();
            async move {
                if let Some(err) = state.pending_error.take() {
                    state.halted = true;
                    return Some((Err(err), state));
                }
                if state.halted {
                    return None;
                }
                let batch = state.batches.pop_front()?;
                let batch_index = state.next_index;
                let size = batch.len();

                if state.pending_clear {
                    state.pending_clear = false;
                    match store.delete_all(&entity, &organization_id).await {
                        Ok(deleted) => info!(entity = %entity, deleted, "replace: 已清空原有记录"),
                        Err(e) => {
                            state.halted = true;
                            error!(batch_index, error = %e, "replace 清空失败");
                            return Some((
                                Err(ImportError::IngestionError {
                                    batch_index,
                                    imported_so_far: 0,
                                    message: e.to_string(),
                                }),
                                state,
                            ));
                        }
                    }
                }

                debug!(batch_index, size, "批次开始");
                let written = match retry {
                    RetryPolicy::None => match strategy {
                        ImportStrategy::Append | ImportStrategy::Replace => {
                            store.insert(&entity, batch).await
                        }
                        ImportStrategy::Update => store.upsert(&entity, batch, &conflict_key).await,
                    },
                };

                match written {
                    Ok(outcome) => {
                        let done = outcome.inserted + outcome.updated;
                        state.committed += done;
                        state.next_index += 1;
                        debug!(batch_index, inserted = outcome.inserted, updated = outcome.updated, "批次完成");
                        Some((
                            Ok(BatchResult {
                                batch_index,
                                imported: outcome.inserted,
                                updated: outcome.updated,
                                skipped: size.saturating_sub(done),
                                errors: 0,
                            }),
                            state,
                        ))
                    }
                    Err(e) => {
                        state.halted = true;
                        error!(batch_index, committed = state.committed, error = %e, "批次写入失败，中止剩余批次");
                        let err = ImportError::IngestionError {
                            batch_index,
                            imported_so_far: state.committed,
                            message: e.to_string(),
                        };
                        Some((Err(err), state))
                    }
                }
            }
        })
    }

    /// 执行全部批次并汇总
    ///
    /// # 参数
    /// - on_progress: 每个成功批次后回调（累计进度单调不减）
    ///
    /// # 返回
    /// - Ok(ExecutionReport): 全部批次成功
    /// - Err(IngestionError): 首个失败批次；imported_so_far 为已提交行数
    #[instrument(skip(self, rows, ctx, on_progress), fields(entity = %ctx.entity, rows = rows.len(), strategy = %strategy))]
    pub async fn execute<F>(
        &self,
        rows: &[CoercedRow],
        strategy: ImportStrategy,
        ctx: &ExecutionContext,
        mut on_progress: F,
    ) -> ImportResult<ExecutionReport>
    where
        F: FnMut(&BatchResult, ImportProgress) + Send,
    {
        let total = rows.len();
        let mut report = ExecutionReport {
            total_rows: total,
            imported: 0,
            updated: 0,
            batches: Vec::with_capacity(self.batch_count(total)),
            progress: ImportProgress {
                processed: 0,
                total,
            },
        };

        let mut batches = Box::pin(self.execute_stream(rows, strategy, ctx));
        let mut processed = 0usize;
        while let Some(result) = batches.next().await {
            let batch = result?;
            report.imported += batch.imported;
            report.updated += batch.updated;
            processed = (processed + batch.imported + batch.updated + batch.skipped).min(total);
            report.progress = ImportProgress { processed, total };
            on_progress(&batch, report.progress);
            report.batches.push(batch);
        }

        info!(
            imported = report.imported,
            updated = report.updated,
            batches = report.batches.len(),
            "导入完成"
        );
        Ok(report)
    }
}
