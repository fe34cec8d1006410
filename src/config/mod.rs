// ==========================================
// 表格数据导入管道 - 配置层
// ==========================================
// 职责: 导入配置加载、内置实体目录、配置期校验
// ==========================================

pub mod builtin_catalogs;
pub mod import_config;

pub use builtin_catalogs::{builtin_entity, BuiltinEntity, BUILTIN_ENTITIES};
pub use import_config::{ImportConfig, ResolvedConfig, DEFAULT_MAPPING_SAMPLE_ROWS};
