// ==========================================
// 表格数据导入管道 - 导入向导状态机
// ==========================================
// 步骤: strategy → upload → mapping → preview → import
// 前进门槛:
// - upload  → mapping : 文件已解析
// - mapping → preview : 必填字段均已映射，且抽样行中有非空值
// - preview → import  : 全部行无 error
// 后退: strategy 之外均可后退；导入开始后禁止
// 重新进入 mapping 使已有校验结果失效（无需重新解析）
// ==========================================

use crate::config::ResolvedConfig;
use crate::domain::{
    BatchResult, CoercedRow, ImportProgress, ImportRun, ImportStrategy, MappingTemplate,
    NotifyLevel, ParsedTable, RunStatus, ValidationSummary, WizardStep,
};
use crate::importer::{
    auto_map, BatchExecutor, ExecutionContext, ExecutionReport, FieldMappingState, ImportError,
    ImportResult, MappingChange, MappingCommand, MappingEditor, RowValidator,
};
use crate::wizard::collaborators::{ImportEvent, Notifier, PipelineServices};
use crate::wizard::session::ImportSession;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 预览：前 n 条转换结果 + 校验汇总
#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub rows: Vec<CoercedRow>,
    pub summary: ValidationSummary,
}

/// 成功导入的结果
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub run_id: String,
    pub entity: String,
    pub mode: ImportStrategy,
    pub report: ExecutionReport,
}

fn blocked(notifier: &dyn Notifier, step: WizardStep, reason: String) -> ImportError {
    notifier.notify(&reason, NotifyLevel::Warning);
    ImportError::StepBlocked { step, reason }
}

fn require_step(session: &ImportSession, expected: &[WizardStep], action: &str) -> ImportResult<()> {
    if session.import_started {
        return Err(ImportError::ImportInProgress);
    }
    if expected.contains(&session.step) {
        Ok(())
    } else {
        Err(ImportError::StepBlocked {
            step: session.step,
            reason: format!("当前步骤不能{}", action),
        })
    }
}

/// 映射步骤门槛
fn mapping_gate(session: &ImportSession, sample_rows: usize) -> Result<(), String> {
    let (Some(table), Some(editor)) = (session.table.as_ref(), session.editor.as_ref()) else {
        return Err("尚未生成映射".to_string());
    };

    let missing: Vec<&str> = editor
        .unmapped_required()
        .iter()
        .map(|f| f.label.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(format!("必填字段未映射: {}", missing.join("、")));
    }

    for field in editor.catalog().required_fields() {
        let Some(source) = editor.mapping().source_for(&field.name) else {
            continue;
        };
        let has_value = table
            .rows
            .iter()
            .take(sample_rows)
            .any(|row| row.get(source).is_some_and(|v| !v.trim().is_empty()));
        if !has_value {
            return Err(format!(
                "必填字段「{}」映射的列「{}」在前 {} 行中没有值",
                field.label, source, sample_rows
            ));
        }
    }
    Ok(())
}

/// 校验结果与当前映射版本不一致时重新校验
fn ensure_validated(session: &mut ImportSession, validator: &RowValidator) {
    if session.validation().is_some() {
        return;
    }
    let (Some(table), Some(editor)) = (session.table.as_ref(), session.editor.as_ref()) else {
        return;
    };
    let summary = validator.validate_all(table, editor.mapping());
    session.validation = Some((editor.revision(), summary));
}

// ==========================================
// ImportWizard
// ==========================================
pub struct ImportWizard {
    config: ResolvedConfig,
    services: PipelineServices,
    session: Option<ImportSession>,
}

impl ImportWizard {
    /// 打开向导（创建新会话）
    pub fn new(config: ResolvedConfig, services: PipelineServices) -> Self {
        let session = ImportSession::new();
        info!(entity = config.entity(), session_id = %session.session_id, "导入向导已打开");
        Self {
            config,
            services,
            session: Some(session),
        }
    }

    pub fn entity(&self) -> &str {
        self.config.entity()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ImportSession> {
        self.session.as_ref()
    }

    pub fn current_step(&self) -> Option<WizardStep> {
        self.session.as_ref().map(|s| s.step)
    }

    fn session_ref(&self) -> ImportResult<&ImportSession> {
        self.session.as_ref().ok_or(ImportError::SessionClosed)
    }

    // ==========================================
    // strategy
    // ==========================================

    pub fn select_strategy(&mut self, strategy: ImportStrategy) -> ImportResult<()> {
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        require_step(session, &[WizardStep::Strategy], "选择导入策略")?;
        if strategy == ImportStrategy::Update && self.config.conflict_key.is_none() {
            return Err(ImportError::ConfigurationError(format!(
                "实体 '{}' 未配置 conflict_key，不支持 update 策略",
                self.config.entity()
            )));
        }
        session.strategy = strategy;
        info!(strategy = %strategy, "已选择导入策略");
        Ok(())
    }

    // ==========================================
    // upload
    // ==========================================

    /// 加载内存中的文件；解析失败时会话保持原状并停留在 upload
    ///
    /// # 返回
    /// - Ok(usize): 数据行数
    pub async fn load_bytes(&mut self, filename: &str, bytes: &[u8]) -> ImportResult<usize> {
        require_step(self.session_ref()?, &[WizardStep::Upload], "加载文件")?;
        let parsed = self.services.parser.parse_bytes(filename, bytes).await;
        self.accept_parsed(filename, parsed)
    }

    /// 读取并加载磁盘文件
    pub async fn load_file<P: AsRef<Path>>(&mut self, path: P) -> ImportResult<usize> {
        require_step(self.session_ref()?, &[WizardStep::Upload], "加载文件")?;
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let parsed = self.services.parser.parse_file(path).await;
        self.accept_parsed(&filename, parsed)
    }

    fn accept_parsed(&mut self, filename: &str, parsed: ImportResult<ParsedTable>) -> ImportResult<usize> {
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        match parsed {
            Ok(table) => {
                let rows = table.row_count();
                self.services.notifier.notify(
                    &format!("已读取文件 {}：{} 列，{} 行", filename, table.headers.len(), rows),
                    NotifyLevel::Info,
                );
                session.file_name = Some(filename.to_string());
                session.table = Some(table);
                session.editor = None;
                session.invalidate_validation();
                Ok(rows)
            }
            Err(e) => {
                self.services
                    .notifier
                    .notify(&e.to_string(), NotifyLevel::Error);
                Err(e)
            }
        }
    }

    // ==========================================
    // mapping
    // ==========================================

    fn editor_mut(&mut self) -> ImportResult<&mut MappingEditor> {
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        require_step(session, &[WizardStep::Mapping], "修改映射")?;
        session
            .editor
            .as_mut()
            .ok_or_else(|| ImportError::InternalError("映射步骤缺少映射编辑器".to_string()))
    }

    /// 人工设置映射（None 为清除）；未知目标字段静默忽略
    pub fn set_mapping(&mut self, source: &str, target: Option<&str>) -> ImportResult<MappingChange> {
        Ok(self.editor_mut()?.set_mapping(source, target))
    }

    /// 执行界面命令（拖放 / 下拉）
    pub fn apply_command(&mut self, command: MappingCommand) -> ImportResult<MappingChange> {
        Ok(self.editor_mut()?.apply_command(command))
    }

    /// 清除全部映射后重新应用自动映射
    pub fn rerun_auto_map(&mut self) -> ImportResult<usize> {
        let patterns = Arc::clone(&self.config.patterns);
        let editor = self.editor_mut()?;
        editor.reset();
        let proposal = auto_map(editor.headers(), &patterns);
        Ok(editor.apply_proposal(&proposal))
    }

    /// 应用已保存模板（视为人工操作）；返回实际变更条数
    pub fn apply_template(&mut self, name: &str) -> ImportResult<usize> {
        let templates = self
            .services
            .templates
            .clone()
            .ok_or_else(|| ImportError::ConfigurationError("未配置模板存储".to_string()))?;
        let entity = self.config.entity().to_string();
        let template = templates
            .get(name, &entity)?
            .ok_or_else(|| ImportError::ConfigurationError(format!("模板不存在: {}", name)))?;

        let editor = self.editor_mut()?;
        let mut applied = 0;
        for (source, target) in template.mappings.iter() {
            if editor.set_mapping(source, Some(target)).is_change() {
                applied += 1;
            }
        }
        info!(template = name, applied, "已应用映射模板");
        Ok(applied)
    }

    /// 将当前映射保存为模板
    pub fn save_template(&mut self, name: &str) -> ImportResult<MappingTemplate> {
        let templates = self
            .services
            .templates
            .clone()
            .ok_or_else(|| ImportError::ConfigurationError("未配置模板存储".to_string()))?;
        let session = self.session_ref()?;
        let editor = session
            .editor
            .as_ref()
            .ok_or_else(|| ImportError::StepBlocked {
                step: session.step,
                reason: "尚未生成映射".to_string(),
            })?;

        let template = MappingTemplate {
            name: name.trim().to_string(),
            entity: self.config.entity().to_string(),
            mappings: editor.mapping().clone(),
            created_at: Utc::now(),
        };
        templates.save(template.clone())?;
        self.services
            .notifier
            .notify(&format!("映射模板「{}」已保存", template.name), NotifyLevel::Success);
        Ok(template)
    }

    /// 每个目标字段的映射状态
    pub fn field_states(&self) -> ImportResult<Vec<FieldMappingState>> {
        let session = self.session_ref()?;
        Ok(session
            .editor
            .as_ref()
            .map(|e| e.field_states())
            .unwrap_or_default())
    }

    // ==========================================
    // preview
    // ==========================================

    /// 与当前映射一致的校验汇总（映射变更后失效）
    pub fn validation_summary(&self) -> Option<&ValidationSummary> {
        self.session.as_ref().and_then(|s| s.validation())
    }

    /// 前 n 条转换结果
    pub fn preview(&mut self, n: usize) -> ImportResult<ImportPreview> {
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        if !matches!(session.step, WizardStep::Preview | WizardStep::Import) {
            return Err(ImportError::StepBlocked {
                step: session.step,
                reason: "尚未进入预览步骤".to_string(),
            });
        }
        ensure_validated(session, &self.config.validator);

        let (Some(table), Some(editor), Some(summary)) = (
            session.table.as_ref(),
            session.editor.as_ref(),
            session.validation(),
        ) else {
            return Err(ImportError::InternalError("预览缺少解析结果或映射".to_string()));
        };

        let rows = table
            .rows
            .iter()
            .take(n)
            .map(|row| self.config.validator.coerce_row(row, editor.mapping()))
            .collect();
        Ok(ImportPreview {
            rows,
            summary: summary.clone(),
        })
    }

    // ==========================================
    // 导航
    // ==========================================

    /// 前进一步（须满足当前步骤门槛）
    pub fn next(&mut self) -> ImportResult<WizardStep> {
        let notifier = Arc::clone(&self.services.notifier);
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        if session.import_started {
            return Err(ImportError::ImportInProgress);
        }

        let current = session.step;
        let Some(target) = current.next() else {
            return Err(ImportError::StepBlocked {
                step: current,
                reason: "导入为最后一步".to_string(),
            });
        };

        match current {
            WizardStep::Strategy | WizardStep::Import => {}
            WizardStep::Upload => {
                let Some(table) = session.table.as_ref() else {
                    return Err(blocked(notifier.as_ref(), current, "尚未上传并解析文件".to_string()));
                };
                if session.editor.is_none() {
                    let mut editor =
                        MappingEditor::new(Arc::clone(&self.config.catalog), table.headers.clone());
                    let proposal = auto_map(&table.headers, &self.config.patterns);
                    editor.apply_proposal(&proposal);
                    session.editor = Some(editor);
                }
                session.invalidate_validation();
            }
            WizardStep::Mapping => {
                mapping_gate(session, self.config.mapping_sample_rows)
                    .map_err(|reason| blocked(notifier.as_ref(), current, reason))?;
                ensure_validated(session, &self.config.validator);
            }
            WizardStep::Preview => {
                ensure_validated(session, &self.config.validator);
                let error_rows = session.validation().map(|s| s.error_rows).unwrap_or(0);
                if error_rows > 0 {
                    return Err(blocked(
                        notifier.as_ref(),
                        current,
                        format!("{} 行存在错误，请修正文件或映射后重试", error_rows),
                    ));
                }
            }
        }

        session.step = target;
        info!(from = %current, to = %target, "向导前进");
        Ok(target)
    }

    /// 后退一步
    pub fn prev(&mut self) -> ImportResult<WizardStep> {
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        if session.import_started {
            return Err(ImportError::ImportInProgress);
        }
        let current = session.step;
        let target = current.prev().ok_or_else(|| ImportError::StepBlocked {
            step: current,
            reason: "已是第一步".to_string(),
        })?;

        if target == WizardStep::Mapping {
            session.invalidate_validation();
        }
        session.step = target;
        info!(from = %current, to = %target, "向导后退");
        Ok(target)
    }

    /// 关闭向导，丢弃会话（导入开始前无任何副作用）
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session_id = %session.session_id, step = %session.step, "导入向导已关闭");
        }
    }

    // ==========================================
    // import
    // ==========================================

    /// 执行导入（仅一次）
    ///
    /// # 参数
    /// - on_progress: 每个成功批次后回调
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 全部批次成功，会话随之丢弃
    /// - Err(IngestionError): 某批次失败；此前批次保持已提交，会话停留在 import
    #[instrument(skip(self, on_progress), fields(entity = %self.config.entity()))]
    pub async fn run_import<F>(&mut self, on_progress: F) -> ImportResult<ImportOutcome>
    where
        F: FnMut(&BatchResult, ImportProgress) + Send,
    {
        let session = self.session.as_mut().ok_or(ImportError::SessionClosed)?;
        require_step(session, &[WizardStep::Import], "开始导入")?;

        let Some(identity) = self.services.identity.identity() else {
            let err = ImportError::ConfigurationError("缺少组织或用户身份，无法导入".to_string());
            self.services.notifier.notify(&err.to_string(), NotifyLevel::Error);
            return Err(err);
        };
        let strategy = session.strategy;
        if strategy == ImportStrategy::Update && self.config.conflict_key.is_none() {
            return Err(ImportError::ConfigurationError(
                "update 策略需要配置 conflict_key".to_string(),
            ));
        }

        ensure_validated(session, &self.config.validator);
        if session.validation().map_or(true, |s| s.has_errors()) {
            return Err(ImportError::StepBlocked {
                step: WizardStep::Import,
                reason: "存在未通过校验的行".to_string(),
            });
        }
        let rows = match (session.table.as_ref(), session.editor.as_ref()) {
            (Some(table), Some(editor)) => self.config.validator.coerce_all(table, editor.mapping()),
            _ => return Err(ImportError::InternalError("导入缺少解析结果或映射".to_string())),
        };

        session.import_started = true;
        let entity = self.config.entity().to_string();
        let run_id = Uuid::new_v4().to_string();
        let ctx = ExecutionContext {
            entity: entity.clone(),
            identity,
            run_id: run_id.clone(),
        };
        let executor = BatchExecutor::new(Arc::clone(&self.services.store))
            .with_batch_size(self.config.batch_size)
            .with_conflict_key(self.config.conflict_key.clone());

        let started_at = Utc::now();
        let result = executor.execute(&rows, strategy, &ctx, on_progress).await;

        let mut run = ImportRun {
            run_id: run_id.clone(),
            entity: entity.clone(),
            mode: strategy,
            organization_id: ctx.identity.organization_id.clone(),
            total_rows: rows.len(),
            imported: 0,
            updated: 0,
            batches_ok: 0,
            status: RunStatus::Completed,
            error: None,
            started_at,
            finished_at: Utc::now(),
        };

        match result {
            Ok(report) => {
                run.imported = report.imported;
                run.updated = report.updated;
                run.batches_ok = report.batches.len();
                self.record_run(&run).await;

                let total_records = report.imported + report.updated;
                self.services.notifier.notify(
                    &format!("导入完成：{} 条记录（新增 {}，更新 {}）", total_records, report.imported, report.updated),
                    NotifyLevel::Success,
                );
                self.services.events.emit(ImportEvent::ImportComplete {
                    entity: entity.clone(),
                    total_records,
                    mode: strategy,
                });
                // 成功后丢弃会话
                self.session = None;

                Ok(ImportOutcome {
                    run_id,
                    entity,
                    mode: strategy,
                    report,
                })
            }
            Err(err) => {
                if let ImportError::IngestionError {
                    batch_index,
                    imported_so_far,
                    ..
                } = &err
                {
                    run.imported = *imported_so_far;
                    run.batches_ok = batch_index.saturating_sub(1);
                } else if let Some(session) = self.session.as_mut() {
                    // 首批前失败，未产生任何写入
                    session.import_started = false;
                }
                run.status = RunStatus::Failed;
                run.error = Some(err.to_string());
                self.record_run(&run).await;

                self.services
                    .notifier
                    .notify(&err.to_string(), NotifyLevel::Error);
                Err(err)
            }
        }
    }

    async fn record_run(&self, run: &ImportRun) {
        let Some(run_log) = self.services.run_log.as_ref() else {
            return;
        };
        if let Err(e) = run_log.record_run(run).await {
            warn!(run_id = %run.run_id, error = %e, "导入运行记录写入失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use crate::repository::{ImportRunLog, SqliteRecordStore};
    use crate::wizard::collaborators::StaticIdentity;

    const PRODUCTS_CSV: &str = "Cod.Art;Descrizione;Prezzo\nA1;Vite;12,50€\nA2;Dado;n/a\n";

    fn wizard() -> (ImportWizard, Arc<SqliteRecordStore>) {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let services = PipelineServices::new(store.clone(), Arc::new(StaticIdentity::new("u1", "org1")))
            .with_run_log(store.clone());
        let config = ImportConfig::for_entity("products").resolve().unwrap();
        (ImportWizard::new(config, services), store)
    }

    #[tokio::test]
    async fn test_upload_gate_requires_parsed_file() {
        let (mut wizard, _) = wizard();
        assert!(matches!(
            wizard.prev(),
            Err(ImportError::StepBlocked { step: WizardStep::Strategy, .. })
        ));
        assert_eq!(wizard.next().unwrap(), WizardStep::Upload);
        assert!(matches!(wizard.next(), Err(ImportError::StepBlocked { .. })));

        // 解析失败：停留在 upload
        let err = wizard.load_bytes("listino.pdf", b"x").await.unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(wizard.current_step(), Some(WizardStep::Upload));

        assert_eq!(wizard.load_bytes("listino.csv", PRODUCTS_CSV.as_bytes()).await.unwrap(), 2);
        assert_eq!(wizard.next().unwrap(), WizardStep::Mapping);
    }

    #[tokio::test]
    async fn test_mapping_edits_invalidate_validation() {
        let (mut wizard, _) = wizard();
        wizard.next().unwrap();
        wizard.load_bytes("listino.csv", PRODUCTS_CSV.as_bytes()).await.unwrap();
        wizard.next().unwrap();
        assert_eq!(wizard.next().unwrap(), WizardStep::Preview);
        let summary = wizard.validation_summary().unwrap();
        assert_eq!(summary.warning_rows, 1, "n/a 价格应为 warning");
        assert_eq!(summary.error_rows, 0);

        // 回到 mapping：校验失效
        assert_eq!(wizard.prev().unwrap(), WizardStep::Mapping);
        assert!(wizard.validation_summary().is_none());

        // 未知目标字段为静默无操作
        assert_eq!(
            wizard.set_mapping("Prezzo", Some("colour")).unwrap(),
            MappingChange::Rejected
        );
        assert_eq!(wizard.set_mapping("Prezzo", None).unwrap(), MappingChange::Cleared);
        assert_eq!(wizard.next().unwrap(), WizardStep::Preview);
        assert_eq!(wizard.validation_summary().unwrap().warning_rows, 0);
    }

    #[tokio::test]
    async fn test_required_field_unmapped_blocks_mapping_step() {
        let (mut wizard, _) = wizard();
        wizard.next().unwrap();
        wizard.load_bytes("listino.csv", PRODUCTS_CSV.as_bytes()).await.unwrap();
        wizard.next().unwrap();
        wizard.set_mapping("Cod.Art", None).unwrap();

        let err = wizard.next().unwrap_err();
        assert!(matches!(err, ImportError::StepBlocked { step: WizardStep::Mapping, .. }));
        assert_eq!(wizard.current_step(), Some(WizardStep::Mapping));
    }

    #[tokio::test]
    async fn test_successful_import_discards_session() {
        let (mut wizard, store) = wizard();
        wizard.next().unwrap();
        wizard.load_bytes("listino.csv", PRODUCTS_CSV.as_bytes()).await.unwrap();
        wizard.next().unwrap();
        wizard.next().unwrap();

        let preview = wizard.preview(1).unwrap();
        assert_eq!(preview.rows.len(), 1);
        assert_eq!(preview.rows[0].get("unit_price").and_then(|v| v.as_f64()), Some(12.5));

        assert_eq!(wizard.next().unwrap(), WizardStep::Import);
        assert!(matches!(wizard.next(), Err(ImportError::StepBlocked { .. })));

        let outcome = wizard.run_import(|_, _| {}).await.unwrap();
        assert_eq!(outcome.report.imported, 2);
        assert!(!wizard.is_open());
        assert!(matches!(wizard.prev(), Err(ImportError::SessionClosed)));
        assert_eq!(store.count("products", "org1").unwrap(), 2);

        let runs = store.recent_runs(Some("products"), 5).await.unwrap();
        assert_eq!(runs[0].run_id, outcome.run_id);
        assert_eq!(runs[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_identity_blocks_import() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let services = PipelineServices::new(store.clone(), Arc::new(StaticIdentity::anonymous()));
        let config = ImportConfig::for_entity("products").resolve().unwrap();
        let mut wizard = ImportWizard::new(config, services);

        wizard.next().unwrap();
        wizard.load_bytes("listino.csv", PRODUCTS_CSV.as_bytes()).await.unwrap();
        for _ in 0..3 {
            wizard.next().unwrap();
        }
        let err = wizard.run_import(|_, _| {}).await.unwrap_err();
        assert!(matches!(err, ImportError::ConfigurationError(_)));
        // 仍可后退
        assert_eq!(wizard.prev().unwrap(), WizardStep::Preview);
        assert_eq!(store.count("products", "").unwrap(), 0);
    }
}
