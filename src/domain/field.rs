// ==========================================
// 表格数据导入管道 - 目标字段模型
// ==========================================
// 职责: 目标字段 / 字段目录 / 自动映射模式表
// 生命周期: 单次导入会话内不可变
// ==========================================

use crate::domain::types::FieldType;
use serde::{Deserialize, Serialize};

// ==========================================
// TargetField - 目标字段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetField {
    pub name: String,  // 唯一键
    pub label: String, // 显示名
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// select 类型的可选值
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TargetField {
    pub fn new(name: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type,
            required: false,
            options: Vec::new(),
            description: None,
        }
    }

    /// 标记为必填
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

// ==========================================
// FieldCatalog - 目标实体的字段目录
// ==========================================
// 字段顺序即展示顺序；name 在目录内唯一（配置期校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCatalog {
    entity: String,
    fields: Vec<TargetField>,
}

impl FieldCatalog {
    pub fn new(entity: &str, fields: Vec<TargetField>) -> Self {
        Self {
            entity: entity.to_string(),
            fields,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[TargetField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&TargetField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &TargetField> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ==========================================
// FieldPatterns - 自动映射模式
// ==========================================
// 表顺序即优先级：先匹配者胜出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatterns {
    pub field: String,
    pub patterns: Vec<String>,
}

impl FieldPatterns {
    pub fn new(field: &str, patterns: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// 有序模式表
pub type PatternTable = Vec<FieldPatterns>;
