// ==========================================
// 表格数据导入管道 - 声明式校验规则
// ==========================================
// 职责: 将配置中的规则编译为行级校验钩子
// ==========================================

use crate::domain::{FieldCatalog, IssueSeverity, Mapping, ParsedRow, RowReport};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::RowValidationHook;
use crate::importer::value_coercer::parse_number;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    MinValue {
        field: String,
        min: f64,
        #[serde(default)]
        severity: IssueSeverity,
    },
    MaxValue {
        field: String,
        max: f64,
        #[serde(default)]
        severity: IssueSeverity,
    },
    Pattern {
        field: String,
        regex: String,
        #[serde(default)]
        severity: IssueSeverity,
        #[serde(default)]
        message: Option<String>,
    },
    MaxLength {
        field: String,
        max: usize,
        #[serde(default)]
        severity: IssueSeverity,
    },
}

impl ValidationRule {
    pub fn field(&self) -> &str {
        match self {
            ValidationRule::MinValue { field, .. }
            | ValidationRule::MaxValue { field, .. }
            | ValidationRule::Pattern { field, .. }
            | ValidationRule::MaxLength { field, .. } => field,
        }
    }

    pub fn severity(&self) -> IssueSeverity {
        match self {
            ValidationRule::MinValue { severity, .. }
            | ValidationRule::MaxValue { severity, .. }
            | ValidationRule::Pattern { severity, .. }
            | ValidationRule::MaxLength { severity, .. } => *severity,
        }
    }
}

struct CompiledRule {
    rule: ValidationRule,
    regex: Option<Regex>,
}

// ==========================================
// RuleSetHook - 规则集钩子
// ==========================================
pub struct RuleSetHook {
    rules: Vec<CompiledRule>,
}

impl RuleSetHook {
    /// 编译规则；字段不在目录内或正则非法为配置错误
    pub fn compile(rules: &[ValidationRule], catalog: &FieldCatalog) -> ImportResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if !catalog.contains(rule.field()) {
                return Err(ImportError::ConfigurationError(format!(
                    "校验规则引用了未知字段: {}",
                    rule.field()
                )));
            }
            let regex = match rule {
                ValidationRule::Pattern { regex, .. } => Some(Regex::new(regex).map_err(|e| {
                    ImportError::ConfigurationError(format!("正则表达式无效 '{}': {}", regex, e))
                })?),
                _ => None,
            };
            compiled.push(CompiledRule {
                rule: rule.clone(),
                regex,
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RowValidationHook for RuleSetHook {
    fn validate(
        &self,
        _row_number: usize,
        row: &ParsedRow,
        mapping: &Mapping,
        catalog: &FieldCatalog,
        report: &mut RowReport,
    ) {
        for compiled in &self.rules {
            let rule = &compiled.rule;
            let Some(value) = mapping
                .source_for(rule.field())
                .and_then(|source| row.get(source))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
            else {
                continue;
            };
            let label = catalog
                .get(rule.field())
                .map(|f| f.label.as_str())
                .unwrap_or(rule.field());

            let violation = match rule {
                ValidationRule::MinValue { min, .. } => parse_number(value)
                    .filter(|n| n < min)
                    .map(|n| format!("字段「{}」的值 {} 小于最小值 {}", label, n, min)),
                ValidationRule::MaxValue { max, .. } => parse_number(value)
                    .filter(|n| n > max)
                    .map(|n| format!("字段「{}」的值 {} 大于最大值 {}", label, n, max)),
                ValidationRule::Pattern { message, .. } => compiled
                    .regex
                    .as_ref()
                    .filter(|re| !re.is_match(value))
                    .map(|_| {
                        message.clone().unwrap_or_else(|| {
                            format!("字段「{}」的值 '{}' 格式不符", label, value)
                        })
                    }),
                ValidationRule::MaxLength { max, .. } => (value.chars().count() > *max)
                    .then(|| format!("字段「{}」超过最大长度 {}", label, max)),
            };

            if let Some(message) = violation {
                match rule.severity() {
                    IssueSeverity::Error => report.errors.push(message),
                    IssueSeverity::Warning => report.warnings.push(message),
                }
            }
        }
    }
}
