// ==========================================
// 表格数据导入管道 - 核心库
// ==========================================
// 流程: 解析 → 自动映射 → 人工修正映射 → 校验/类型转换 → 分批入库
// 技术栈: Rust + tokio + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 字段目录、解析结果、映射、校验结果
pub mod domain;

// 导入层 - 解析、映射、校验、批次执行
pub mod importer;

// 数据仓储层 - 记录存储、运行日志、映射模板
pub mod repository;

// 配置层 - 导入配置与内置实体目录
pub mod config;

// 向导层 - 导入会话状态机
pub mod wizard;

// API 层 - 宿主接口
pub mod api;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    FieldCatalog, FieldType, ImportStrategy, Mapping, ParsedTable, TargetField, TypedValue,
    ValidationSummary, WizardStep,
};

// 导入组件
pub use importer::{
    auto_map, BatchExecutor, ImportError, ImportResult, MappingEditor, RowValidator,
    UniversalFileParser,
};

// 配置
pub use config::{ImportConfig, ResolvedConfig};

// 向导
pub use wizard::{ImportWizard, PipelineServices};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "tabular-import";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
