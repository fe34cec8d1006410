// ==========================================
// 表格数据导入管道 - 导入层
// ==========================================
// 流程: 解析 → 自动映射 → 映射编辑 → 校验/类型转换 → 分批入库
// 支持: CSV（分隔符嗅探）, Excel（外部转换能力）
// ==========================================

// 模块声明
pub mod batch_executor;
pub mod column_mapper;
pub mod error;
pub mod file_parser;
pub mod importer_trait;
pub mod mapping_editor;
pub mod validation_rules;
pub mod validator;
pub mod value_coercer;

// 重导出核心类型
pub use batch_executor::{
    to_store_record, BatchExecutor, ExecutionContext, ExecutionReport, RetryPolicy,
    DEFAULT_BATCH_SIZE,
};
pub use column_mapper::{auto_map, match_header, normalize, patterns_from_catalog};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CalamineExcelConverter, CsvParser, UniversalFileParser};
pub use mapping_editor::{FieldMappingState, MappingChange, MappingCommand, MappingEditor};
pub use validation_rules::{RuleSetHook, ValidationRule};
pub use validator::{coerce_row, validate_row, RowValidator, DEFAULT_ISSUE_LIMIT};
pub use value_coercer::coerce_value;

// 重导出 Trait 接口
pub use importer_trait::{ExcelConverter, FileParser, RowValidationHook};
