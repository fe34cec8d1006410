// ==========================================
// 表格数据导入管道 - 导入会话
// ==========================================
// 聚合: 当前文件、解析结果、映射、策略、校验汇总、所处步骤
// 所有权: 仅由 ImportWizard 持有并修改
// ==========================================

use crate::domain::{ImportStrategy, ParsedTable, ValidationSummary, WizardStep};
use crate::importer::MappingEditor;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ImportSession {
    pub(crate) session_id: String,
    pub(crate) opened_at: DateTime<Utc>,
    pub(crate) step: WizardStep,
    pub(crate) strategy: ImportStrategy,
    pub(crate) file_name: Option<String>,
    pub(crate) table: Option<ParsedTable>,
    pub(crate) editor: Option<MappingEditor>,
    /// 校验汇总及其对应的映射版本
    pub(crate) validation: Option<(u64, ValidationSummary)>,
    pub(crate) import_started: bool,
}

impl ImportSession {
    pub(crate) fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            opened_at: Utc::now(),
            step: WizardStep::Strategy,
            strategy: ImportStrategy::default(),
            file_name: None,
            table: None,
            editor: None,
            validation: None,
            import_started: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn strategy(&self) -> ImportStrategy {
        self.strategy
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn table(&self) -> Option<&ParsedTable> {
        self.table.as_ref()
    }

    pub fn editor(&self) -> Option<&MappingEditor> {
        self.editor.as_ref()
    }

    pub fn import_started(&self) -> bool {
        self.import_started
    }

    /// 仍与当前映射版本一致的校验汇总
    pub fn validation(&self) -> Option<&ValidationSummary> {
        let revision = self.editor.as_ref().map(|e| e.revision())?;
        self.validation
            .as_ref()
            .filter(|(validated, _)| *validated == revision)
            .map(|(_, summary)| summary)
    }

    pub(crate) fn invalidate_validation(&mut self) {
        self.validation = None;
    }
}
