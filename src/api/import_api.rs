// ==========================================
// 表格数据导入 API
// ==========================================
// 职责: 宿主入口（init / 打开向导 / 模板管理 / 运行历史 / 无界面整文件导入）
// 宿主在依赖（记录存储、字段目录）就绪后构造，无需轮询等待
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ImportConfig, ResolvedConfig};
use crate::domain::{FieldCatalog, ImportRun, ImportStrategy, MappingTemplate, WizardStep};
use crate::wizard::{ImportWizard, PipelineServices};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// 运行历史默认条数上限
const MAX_RECENT_RUNS: usize = 100;

/// 整文件导入响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    /// 运行 ID（写入每条记录的 import_run_id）
    pub run_id: String,
    pub entity: String,
    pub mode: ImportStrategy,
    pub total_rows: usize,
    /// 新增数量
    pub imported: usize,
    /// 更新数量
    pub updated: usize,
    pub batches: usize,
    /// 仅有 warning 的行数
    pub warning_rows: usize,
    /// 自动映射结果（源列 → 目标字段）
    pub mappings: Vec<(String, String)>,
    /// 导入耗时（毫秒）
    pub elapsed_ms: i64,
}

/// 导入API
pub struct ImportApi {
    config: ResolvedConfig,
    services: PipelineServices,
}

impl ImportApi {
    /// 配置目标实体并注入依赖
    pub fn init(config: &ImportConfig, services: PipelineServices) -> ApiResult<Self> {
        let config = config.resolve()?;
        info!(entity = config.entity(), "导入 API 已初始化");
        Ok(Self { config, services })
    }

    pub fn entity(&self) -> &str {
        self.config.entity()
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.config.catalog
    }

    /// 生效的冲突键（显式配置或内置实体默认）
    pub fn conflict_key(&self) -> Option<&str> {
        self.config.conflict_key.as_deref()
    }

    /// 打开向导（每次返回独立会话）
    pub fn open_session(&self) -> ImportWizard {
        ImportWizard::new(self.config.clone(), self.services.clone())
    }

    // ==========================================
    // 模板
    // ==========================================

    pub fn list_templates(&self) -> ApiResult<Vec<MappingTemplate>> {
        let Some(templates) = self.services.templates.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(templates.list(self.entity())?)
    }

    pub fn delete_template(&self, name: &str) -> ApiResult<()> {
        let templates = self
            .services
            .templates
            .as_ref()
            .ok_or_else(|| ApiError::ConfigurationError("未配置模板存储".to_string()))?;
        if templates.delete(name, self.entity())? {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("模板不存在: {}", name)))
        }
    }

    // ==========================================
    // 运行历史
    // ==========================================

    /// 本实体最近的导入运行（按开始时间倒序）
    pub async fn recent_runs(&self, limit: usize) -> ApiResult<Vec<ImportRun>> {
        let Some(run_log) = self.services.run_log.as_ref() else {
            return Ok(Vec::new());
        };
        let limit = limit.clamp(1, MAX_RECENT_RUNS);
        Ok(run_log.recent_runs(Some(self.entity()), limit).await?)
    }

    // ==========================================
    // 无界面整文件导入
    // ==========================================

    /// 自动映射（可选模板覆盖）→ 校验 → 导入
    ///
    /// # 参数
    /// - file_path: CSV / Excel 文件路径
    /// - strategy: 导入策略
    /// - template: 可选映射模板名
    ///
    /// # 返回
    /// - Ok(ImportApiResponse): 导入结果
    /// - Err(ApiError::ValidationError): 存在 error 行，未导入
    pub async fn import_file<P: AsRef<Path>>(
        &self,
        file_path: P,
        strategy: ImportStrategy,
        template: Option<&str>,
    ) -> ApiResult<ImportApiResponse> {
        let started = Instant::now();
        let mut wizard = self.open_session();

        wizard.select_strategy(strategy)?;
        wizard.next()?;
        let total_rows = wizard.load_file(file_path.as_ref()).await?;
        wizard.next()?;
        if let Some(name) = template {
            wizard.apply_template(name)?;
        }
        let mappings: Vec<(String, String)> = wizard
            .session()
            .and_then(|s| s.editor())
            .map(|e| {
                e.mapping()
                    .iter()
                    .map(|(s, t)| (s.to_string(), t.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        wizard.next()?;
        let warning_rows = wizard
            .validation_summary()
            .map(|s| s.warning_rows)
            .unwrap_or(0);
        if let Err(err) = wizard.next() {
            let detail = wizard
                .validation_summary()
                .map(|s| {
                    s.issues
                        .iter()
                        .filter(|i| i.is_blocking())
                        .take(5)
                        .map(|i| format!("第 {} 行: {}", i.row, i.errors.join("; ")))
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .unwrap_or_default();
            wizard.close();
            return Err(ApiError::ValidationError(format!("{} ({})", err, detail)));
        }
        debug_assert_eq!(wizard.current_step(), Some(WizardStep::Import));

        let outcome = wizard
            .run_import(|batch, progress| {
                info!(
                    batch = batch.batch_index,
                    percent = progress.percent(),
                    "导入进度"
                );
            })
            .await?;

        Ok(ImportApiResponse {
            run_id: outcome.run_id,
            entity: outcome.entity,
            mode: outcome.mode,
            total_rows,
            imported: outcome.report.imported,
            updated: outcome.report.updated,
            batches: outcome.report.batches.len(),
            warning_rows,
            mappings,
            elapsed_ms: started.elapsed().as_millis() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRecordStore;
    use crate::wizard::StaticIdentity;
    use std::sync::Arc;

    #[test]
    fn test_init_rejects_unknown_entity() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let services = PipelineServices::new(store, Arc::new(StaticIdentity::new("u1", "org1")));
        let result = ImportApi::init(&ImportConfig::for_entity("invoices"), services);
        assert!(matches!(result, Err(ApiError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_open_session_gives_independent_wizards() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let services = PipelineServices::new(store, Arc::new(StaticIdentity::new("u1", "org1")));
        let api = ImportApi::init(&ImportConfig::for_entity("shipments"), services).unwrap();

        let mut first = api.open_session();
        let second = api.open_session();
        first.next().unwrap();
        assert_eq!(first.current_step(), Some(WizardStep::Upload));
        assert_eq!(second.current_step(), Some(WizardStep::Strategy));

        assert!(api.list_templates().unwrap().is_empty());
        assert!(api.recent_runs(10).await.unwrap().is_empty());
    }
}
