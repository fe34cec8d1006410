// ==========================================
// 表格数据导入管道 - 导入领域模型
// ==========================================
// 职责: 解析结果 / 列映射 / 校验问题 / 批次结果 / 导入运行记录
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::types::ImportStrategy;

// ==========================================
// ParsedRow / ParsedTable - 解析结果
// ==========================================
/// 一行数据：源列名 → 原始字符串（缺失列为空串）
pub type ParsedRow = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<ParsedRow>,
}

impl ParsedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 取某列的单元格值（行不存在或列不存在时返回空串）
    pub fn cell(&self, row: usize, header: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(header))
            .map(String::as_str)
            .unwrap_or("")
    }
}

// ==========================================
// Mapping - 源列 → 目标字段（部分函数）
// ==========================================
// 不变量: 任一目标字段至多被一个源列指向
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: BTreeMap<String, String>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 源列对应的目标字段
    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    /// 指向目标字段的源列
    pub fn source_for(&self, target: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, t)| t.as_str() == target)
            .map(|(s, _)| s.as_str())
    }

    /// 赋值并维护唯一性；返回被顶替的源列（若有）
    pub fn assign(&mut self, source: &str, target: &str) -> Option<String> {
        let displaced = self
            .source_for(target)
            .filter(|s| *s != source)
            .map(str::to_string);
        if let Some(prev) = &displaced {
            self.entries.remove(prev);
        }
        self.entries.insert(source.to_string(), target.to_string());
        displaced
    }

    pub fn unassign(&mut self, source: &str) -> Option<String> {
        self.entries.remove(source)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (source, target) in iter {
            mapping.assign(source, target);
        }
        mapping
    }
}

// ==========================================
// TypedValue / CoercedRow - 类型转换结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Number(f64),
    /// text / select / date(ISO YYYY-MM-DD)
    Text(String),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 用作冲突键的字符串形式
    pub fn key_string(&self) -> Option<String> {
        match self {
            TypedValue::Null => None,
            TypedValue::Bool(b) => Some(b.to_string()),
            TypedValue::Number(n) => Some(n.to_string()),
            TypedValue::Text(s) => Some(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoercedRow {
    pub values: BTreeMap<String, TypedValue>,
    /// 未映射源列（allow_custom_fields 时保留）
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
}

impl CoercedRow {
    pub fn get(&self, field: &str) -> Option<&TypedValue> {
        self.values.get(field)
    }
}

// ==========================================
// 校验结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RowReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// 行级问题（row 为 1-based 数据行号）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub row: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationIssue {
    /// 有 error 的行不可导入
    pub fn is_blocking(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// 全量校验汇总（只读；闸门为 error_rows == 0）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub warning_rows: usize,
    pub error_rows: usize,
    /// 前 N 条问题明细
    pub issues: Vec<ValidationIssue>,
    pub truncated: bool,
}

impl ValidationSummary {
    pub fn has_errors(&self) -> bool {
        self.error_rows > 0
    }

    /// 可导入行数（无 error 的行）
    pub fn importable_rows(&self) -> usize {
        self.valid_rows + self.warning_rows
    }
}

// ==========================================
// 批次结果与进度
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: usize, // 1-based
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub processed: usize,
    pub total: usize,
}

impl ImportProgress {
    /// 完成比例 [0, 1]；空导入视为已完成
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn percent(&self) -> u8 {
        (self.ratio() * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

// ==========================================
// Identity - 已认证身份（外部给定）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub organization_id: String,
}

// ==========================================
// MappingTemplate - 已保存的映射模板
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTemplate {
    pub name: String,
    pub entity: String,
    pub mappings: Mapping,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// ImportRun - 导入运行记录
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().trim_matches('"') {
            "COMPLETED" => RunStatus::Completed,
            _ => RunStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub run_id: String,
    pub entity: String,
    pub mode: ImportStrategy,
    pub organization_id: String,
    pub total_rows: usize,
    pub imported: usize,
    pub updated: usize,
    pub batches_ok: usize,
    pub status: RunStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
