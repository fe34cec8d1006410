// ==========================================
// 表格数据导入管道 - 领域类型定义
// ==========================================
// 职责: 字段类型 / 导入策略 / 向导步骤 / 通知级别
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 字段类型 (Field Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Boolean,
    Currency,
    Percentage,
    Select,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Number => write!(f, "number"),
            FieldType::Date => write!(f, "date"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Currency => write!(f, "currency"),
            FieldType::Percentage => write!(f, "percentage"),
            FieldType::Select => write!(f, "select"),
        }
    }
}

// ==========================================
// 导入策略 (Import Strategy)
// ==========================================
// append: 追加插入 / replace: 先删后插 / update: 按冲突键 upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    #[default]
    Append,
    Replace,
    Update,
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStrategy::Append => write!(f, "append"),
            ImportStrategy::Replace => write!(f, "replace"),
            ImportStrategy::Update => write!(f, "update"),
        }
    }
}

impl FromStr for ImportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(ImportStrategy::Append),
            "replace" => Ok(ImportStrategy::Replace),
            "update" | "upsert" => Ok(ImportStrategy::Update),
            other => Err(format!(
                "无效的导入策略: {}，应为 append/replace/update",
                other
            )),
        }
    }
}

// ==========================================
// 向导步骤 (Wizard Step)
// ==========================================
// 顺序: strategy → upload → mapping → preview → import
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    Strategy,
    Upload,
    Mapping,
    Preview,
    Import,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::Strategy,
        WizardStep::Upload,
        WizardStep::Mapping,
        WizardStep::Preview,
        WizardStep::Import,
    ];

    /// 下一步（import 为终态，无下一步）
    pub fn next(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Strategy => Some(WizardStep::Upload),
            WizardStep::Upload => Some(WizardStep::Mapping),
            WizardStep::Mapping => Some(WizardStep::Preview),
            WizardStep::Preview => Some(WizardStep::Import),
            WizardStep::Import => None,
        }
    }

    /// 上一步（strategy 为首步，无上一步）
    pub fn prev(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Strategy => None,
            WizardStep::Upload => Some(WizardStep::Strategy),
            WizardStep::Mapping => Some(WizardStep::Upload),
            WizardStep::Preview => Some(WizardStep::Mapping),
            WizardStep::Import => Some(WizardStep::Preview),
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardStep::Strategy => write!(f, "strategy"),
            WizardStep::Upload => write!(f, "upload"),
            WizardStep::Mapping => write!(f, "mapping"),
            WizardStep::Preview => write!(f, "preview"),
            WizardStep::Import => write!(f, "import"),
        }
    }
}

// ==========================================
// 通知级别 (Notify Level)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyLevel::Info => write!(f, "info"),
            NotifyLevel::Success => write!(f, "success"),
            NotifyLevel::Warning => write!(f, "warning"),
            NotifyLevel::Error => write!(f, "error"),
        }
    }
}

// ==========================================
// 问题严重度 (Issue Severity)
// ==========================================
// error 阻断导入；warning 仅标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    #[default]
    Error,
    Warning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wizard_step_order() {
        let mut step = WizardStep::Strategy;
        let mut visited = vec![step];
        while let Some(next) = step.next() {
            visited.push(next);
            step = next;
        }
        assert_eq!(visited, WizardStep::ALL.to_vec());
        assert_eq!(WizardStep::Strategy.prev(), None);
        assert_eq!(WizardStep::Import.next(), None);
    }

    #[test]
    fn test_import_strategy_from_str() {
        assert_eq!("append".parse::<ImportStrategy>(), Ok(ImportStrategy::Append));
        assert_eq!(" Replace ".parse::<ImportStrategy>(), Ok(ImportStrategy::Replace));
        assert_eq!("upsert".parse::<ImportStrategy>(), Ok(ImportStrategy::Update));
        assert!("merge".parse::<ImportStrategy>().is_err());
    }

    #[test]
    fn test_field_type_serde_lowercase() {
        let json = serde_json::to_string(&FieldType::Currency).unwrap();
        assert_eq!(json, "\"currency\"");
        let parsed: FieldType = serde_json::from_str("\"percentage\"").unwrap();
        assert_eq!(parsed, FieldType::Percentage);
    }
}
