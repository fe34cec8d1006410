// ==========================================
// 表格数据导入管道 - 领域模型层
// ==========================================
// 职责: 定义目标字段、解析结果、映射、校验与批次结果
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod field;
pub mod import;
pub mod types;

// 重导出核心类型
pub use field::{FieldCatalog, FieldPatterns, PatternTable, TargetField};
pub use import::{
    BatchResult, CoercedRow, Identity, ImportProgress, ImportRun, Mapping, MappingTemplate,
    ParsedRow, ParsedTable, RowReport, RunStatus, TypedValue, ValidationIssue, ValidationSummary,
};
pub use types::{FieldType, ImportStrategy, IssueSeverity, NotifyLevel, WizardStep};
