// ==========================================
// 表格数据导入管道 - 导入配置
// ==========================================
// 职责: 宿主传入 init 的配置；解析为字段目录 + 模式表 + 校验器
// 校验: 配置期完成（实体名、字段唯一、批次大小、冲突键、select 可选值、规则）
// ==========================================

use crate::config::builtin_catalogs::builtin_entity;
use crate::domain::{FieldCatalog, FieldPatterns, FieldType, PatternTable, TargetField};
use crate::importer::batch_executor::DEFAULT_BATCH_SIZE;
use crate::importer::column_mapper::patterns_from_catalog;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::validation_rules::{RuleSetHook, ValidationRule};
use crate::importer::validator::{RowValidator, DEFAULT_ISSUE_LIMIT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// 映射步骤抽样行数默认值
pub const DEFAULT_MAPPING_SAMPLE_ROWS: usize = 10;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_issue_limit() -> usize {
    DEFAULT_ISSUE_LIMIT
}

fn default_sample_rows() -> usize {
    DEFAULT_MAPPING_SAMPLE_ROWS
}

// ==========================================
// ImportConfig - 宿主配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub entity: String,
    /// 显式字段目录；缺省时使用内置实体目录
    #[serde(default)]
    pub target_fields: Option<Vec<TargetField>>,
    /// 自动映射模式表；缺省时使用内置模式表或由目录派生
    #[serde(default)]
    pub field_patterns: Option<Vec<FieldPatterns>>,
    #[serde(default)]
    pub validation_rules: Option<Vec<ValidationRule>>,
    #[serde(default)]
    pub allow_custom_fields: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// update 策略的冲突键；缺省时取内置实体的默认键
    #[serde(default)]
    pub conflict_key: Option<String>,
    #[serde(default = "default_issue_limit")]
    pub preview_issue_limit: usize,
    #[serde(default = "default_sample_rows")]
    pub mapping_sample_rows: usize,
}

impl ImportConfig {
    /// 仅指定实体、其余取默认值
    pub fn for_entity(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            target_fields: None,
            field_patterns: None,
            validation_rules: None,
            allow_custom_fields: false,
            batch_size: DEFAULT_BATCH_SIZE,
            conflict_key: None,
            preview_issue_limit: DEFAULT_ISSUE_LIMIT,
            mapping_sample_rows: DEFAULT_MAPPING_SAMPLE_ROWS,
        }
    }

    /// 从 JSON 文件加载
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ImportResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> ImportResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ImportError::ConfigurationError(format!("配置 JSON 无效: {}", e)))
    }

    /// 校验并解析为运行期配置
    pub fn resolve(&self) -> ImportResult<ResolvedConfig> {
        let entity = self.entity.trim();
        if entity.is_empty() {
            return Err(config_error("实体名不能为空"));
        }
        if self.batch_size == 0 {
            return Err(config_error("batch_size 必须大于 0"));
        }

        let builtin = builtin_entity(entity);
        let catalog = match (&self.target_fields, &builtin) {
            (Some(fields), _) => FieldCatalog::new(entity, fields.clone()),
            (None, Some(b)) => b.catalog.clone(),
            (None, None) => {
                return Err(config_error(&format!(
                    "实体 '{}' 没有内置字段目录，且未提供 target_fields",
                    entity
                )))
            }
        };
        validate_catalog(&catalog)?;

        let patterns: PatternTable = match (&self.field_patterns, &builtin, &self.target_fields) {
            (Some(p), _, _) => p.clone(),
            (None, Some(b), None) => b.patterns.clone(),
            _ => patterns_from_catalog(&catalog),
        };
        for entry in &patterns {
            if !catalog.contains(&entry.field) {
                return Err(config_error(&format!(
                    "模式表引用了未知字段: {}",
                    entry.field
                )));
            }
        }

        let conflict_key = self
            .conflict_key
            .clone()
            .or_else(|| builtin.as_ref().map(|b| b.conflict_key.to_string()))
            .filter(|k| catalog.contains(k));
        if let Some(key) = &self.conflict_key {
            if !catalog.contains(key) {
                return Err(config_error(&format!("conflict_key '{}' 不是目录字段", key)));
            }
        }

        let catalog = Arc::new(catalog);
        let mut validator = RowValidator::new(Arc::clone(&catalog))
            .with_custom_fields(self.allow_custom_fields)
            .with_conflict_key(conflict_key.clone())
            .with_issue_limit(self.preview_issue_limit);
        if let Some(rules) = self.validation_rules.as_deref().filter(|r| !r.is_empty()) {
            let hook = RuleSetHook::compile(rules, &catalog)?;
            validator = validator.with_hook(Arc::new(hook));
        }

        info!(
            entity,
            fields = catalog.len(),
            patterns = patterns.len(),
            conflict_key = conflict_key.as_deref().unwrap_or("-"),
            "导入配置已解析"
        );

        Ok(ResolvedConfig {
            catalog,
            patterns: Arc::new(patterns),
            validator,
            batch_size: self.batch_size,
            conflict_key,
            mapping_sample_rows: self.mapping_sample_rows.max(1),
        })
    }
}

fn config_error(message: &str) -> ImportError {
    ImportError::ConfigurationError(message.to_string())
}

fn validate_catalog(catalog: &FieldCatalog) -> ImportResult<()> {
    if catalog.is_empty() {
        return Err(config_error("字段目录为空"));
    }
    let mut seen = HashSet::new();
    for field in catalog.fields() {
        if field.name.trim().is_empty() {
            return Err(config_error("字段名不能为空"));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(config_error(&format!("字段名重复: {}", field.name)));
        }
        if field.field_type == FieldType::Select && field.options.is_empty() {
            return Err(config_error(&format!(
                "select 字段 '{}' 至少需要一个可选值",
                field.name
            )));
        }
    }
    Ok(())
}

// ==========================================
// ResolvedConfig - 运行期配置（不可变，会话间共享）
// ==========================================
#[derive(Clone)]
pub struct ResolvedConfig {
    pub catalog: Arc<FieldCatalog>,
    pub patterns: Arc<PatternTable>,
    pub validator: RowValidator,
    pub batch_size: usize,
    pub conflict_key: Option<String>,
    pub mapping_sample_rows: usize,
}

impl ResolvedConfig {
    pub fn entity(&self) -> &str {
        self.catalog.entity()
    }
}
