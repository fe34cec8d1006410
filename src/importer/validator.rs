// ==========================================
// 表格数据导入管道 - 行校验与类型转换
// ==========================================
// 规则:
// - 必填字段缺失/为空 → error（阻断该行导入）
// - 类型不合法 → warning（不阻断，按尽力转换值导入，失败为 Null）
// - 自定义钩子可追加 errors / warnings
// ==========================================

use crate::domain::{
    CoercedRow, FieldCatalog, FieldType, Mapping, ParsedRow, ParsedTable, RowReport, TargetField,
    ValidationIssue, ValidationSummary,
};
use crate::importer::importer_trait::RowValidationHook;
use crate::importer::value_coercer::{
    coerce_value, is_boolean_literal, is_plain_number, match_option, parse_date, parse_number,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 预览明细默认条数
pub const DEFAULT_ISSUE_LIMIT: usize = 50;

/// 取映射到目标字段的单元格值（去空白；未映射或缺列为 None）
fn mapped_value<'a>(row: &'a ParsedRow, mapping: &Mapping, field: &str) -> Option<&'a str> {
    mapping
        .source_for(field)
        .and_then(|source| row.get(source))
        .map(|v| v.trim())
}

/// 单元格类型合理性检查，返回 warning 文本
fn type_warning(field: &TargetField, value: &str) -> Option<String> {
    match field.field_type {
        FieldType::Number | FieldType::Percentage
            if !is_plain_number(value, field.field_type == FieldType::Percentage) =>
        {
            Some(format!("字段「{}」的值 '{}' 不是有效数字", field.label, value))
        }
        FieldType::Currency if parse_number(value).is_none() => Some(format!(
            "字段「{}」的值 '{}' 不是有效金额",
            field.label, value
        )),
        FieldType::Date if parse_date(value).is_none() => Some(format!(
            "字段「{}」的值 '{}' 不是有效日期",
            field.label, value
        )),
        FieldType::Boolean if !is_boolean_literal(value) => Some(format!(
            "字段「{}」的值 '{}' 不是可识别的布尔值，按 false 处理",
            field.label, value
        )),
        FieldType::Select
            if !field.options.is_empty() && match_option(value, &field.options).is_none() =>
        {
            Some(format!(
                "字段「{}」的值 '{}' 不在可选值内",
                field.label, value
            ))
        }
        _ => None,
    }
}

/// 校验单行（不含自定义钩子）
pub fn validate_row(row: &ParsedRow, mapping: &Mapping, catalog: &FieldCatalog) -> RowReport {
    let mut report = RowReport::default();

    // 必填字段
    for field in catalog.required_fields() {
        let present = mapped_value(row, mapping, &field.name).is_some_and(|v| !v.is_empty());
        if !present {
            report
                .errors
                .push(format!("必填字段「{}」缺失或为空", field.label));
        }
    }

    // 类型合理性（仅已映射且非空的单元格）
    for (source, target) in mapping.iter() {
        let Some(field) = catalog.get(target) else {
            continue;
        };
        let value = row.get(source).map(|v| v.trim()).unwrap_or("");
        if value.is_empty() {
            continue;
        }
        if let Some(warning) = type_warning(field, value) {
            report.warnings.push(warning);
        }
    }

    report
}

/// 转换单行为目标字段的类型化值（全函数，不会失败）
///
/// 目录中每个字段都出现在结果中；未映射字段为 Null。
pub fn coerce_row(row: &ParsedRow, mapping: &Mapping, catalog: &FieldCatalog) -> CoercedRow {
    let mut coerced = CoercedRow::default();
    for field in catalog.fields() {
        let value = mapped_value(row, mapping, &field.name)
            .map(|raw| coerce_value(raw, field))
            .unwrap_or(crate::domain::TypedValue::Null);
        coerced.values.insert(field.name.clone(), value);
    }
    coerced
}

// ==========================================
// RowValidator - 带钩子与汇总的校验器
// ==========================================
#[derive(Clone)]
pub struct RowValidator {
    catalog: Arc<FieldCatalog>,
    hooks: Vec<Arc<dyn RowValidationHook>>,
    allow_custom_fields: bool,
    conflict_key: Option<String>,
    issue_limit: usize,
}

impl RowValidator {
    pub fn new(catalog: Arc<FieldCatalog>) -> Self {
        Self {
            catalog,
            hooks: Vec::new(),
            allow_custom_fields: false,
            conflict_key: None,
            issue_limit: DEFAULT_ISSUE_LIMIT,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn RowValidationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_custom_fields(mut self, allow: bool) -> Self {
        self.allow_custom_fields = allow;
        self
    }

    /// 冲突键：文件内重复值标记为 warning
    pub fn with_conflict_key(mut self, key: Option<String>) -> Self {
        self.conflict_key = key;
        self
    }

    pub fn with_issue_limit(mut self, limit: usize) -> Self {
        self.issue_limit = limit;
        self
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// 校验单行（含自定义钩子）
    ///
    /// # 参数
    /// - row_number: 1-based 数据行号
    pub fn validate_row(&self, row_number: usize, row: &ParsedRow, mapping: &Mapping) -> RowReport {
        let mut report = validate_row(row, mapping, &self.catalog);
        for hook in &self.hooks {
            hook.validate(row_number, row, mapping, &self.catalog, &mut report);
        }
        report
    }

    /// 转换单行；允许自定义字段时保留未映射源列
    pub fn coerce_row(&self, row: &ParsedRow, mapping: &Mapping) -> CoercedRow {
        let mut coerced = coerce_row(row, mapping, &self.catalog);
        if self.allow_custom_fields {
            for (header, value) in row {
                let value = value.trim();
                if mapping.target_of(header).is_none() && !value.is_empty() {
                    coerced
                        .custom_fields
                        .insert(header.clone(), value.to_string());
                }
            }
        }
        coerced
    }

    /// 全量校验，产出计数与前 N 条问题明细
    pub fn validate_all(&self, table: &ParsedTable, mapping: &Mapping) -> ValidationSummary {
        let mut summary = ValidationSummary {
            total_rows: table.rows.len(),
            ..Default::default()
        };

        let key_field = self
            .conflict_key
            .as_deref()
            .and_then(|k| self.catalog.get(k));
        let mut seen_keys: HashMap<String, usize> = HashMap::new();

        for (idx, row) in table.rows.iter().enumerate() {
            let row_number = idx + 1;
            let mut report = self.validate_row(row_number, row, mapping);

            // 文件内冲突键重复
            if let Some(field) = key_field {
                if let Some(value) = mapped_value(row, mapping, &field.name).filter(|v| !v.is_empty())
                {
                    let normalized = value.to_lowercase();
                    if let Some(first) = seen_keys.get(&normalized) {
                        report.warnings.push(format!(
                            "字段「{}」的值 '{}' 与第 {} 行重复",
                            field.label, value, first
                        ));
                    } else {
                        seen_keys.insert(normalized, row_number);
                    }
                }
            }

            if !report.errors.is_empty() {
                summary.error_rows += 1;
            } else if !report.warnings.is_empty() {
                summary.warning_rows += 1;
            } else {
                summary.valid_rows += 1;
            }

            if !report.is_clean() {
                if summary.issues.len() < self.issue_limit {
                    summary.issues.push(ValidationIssue {
                        row: row_number,
                        errors: report.errors,
                        warnings: report.warnings,
                    });
                } else {
                    summary.truncated = true;
                }
            }
        }

        info!(
            total = summary.total_rows,
            valid = summary.valid_rows,
            warning = summary.warning_rows,
            error = summary.error_rows,
            "校验完成"
        );
        summary
    }

    /// 转换全部行（调用方须先确认无 error 行）
    pub fn coerce_all(&self, table: &ParsedTable, mapping: &Mapping) -> Vec<CoercedRow> {
        table
            .rows
            .iter()
            .map(|row| self.coerce_row(row, mapping))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TypedValue;

    fn catalog() -> Arc<FieldCatalog> {
        Arc::new(FieldCatalog::new(
            "products",
            vec![
                TargetField::new("sku", "SKU", FieldType::Text).required(),
                TargetField::new("unit_price", "单价", FieldType::Currency),
                TargetField::new("weight", "重量", FieldType::Number),
                TargetField::new("launch_date", "上市日期", FieldType::Date),
                TargetField::new("active", "启用", FieldType::Boolean),
            ],
        ))
    }

    fn mapping() -> Mapping {
        [
            ("Codice", "sku"),
            ("Prezzo", "unit_price"),
            ("Peso", "weight"),
            ("Data", "launch_date"),
        ]
        .into_iter()
        .collect()
    }

    fn row(pairs: &[(&str, &str)]) -> ParsedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_currency_example_is_warning_free() {
        let r = row(&[("Codice", "A1"), ("Prezzo", "12,50€")]);
        let report = validate_row(&r, &mapping(), &catalog());
        assert!(report.is_clean(), "{:?}", report);
        let coerced = coerce_row(&r, &mapping(), &catalog());
        assert_eq!(coerced.get("unit_price"), Some(&TypedValue::Number(12.5)));
    }

    #[test]
    fn test_unparsable_currency_is_warning_not_error() {
        let r = row(&[("Codice", "A1"), ("Prezzo", "n/a")]);
        let report = validate_row(&r, &mapping(), &catalog());
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        let coerced = coerce_row(&r, &mapping(), &catalog());
        assert_eq!(coerced.get("unit_price"), Some(&TypedValue::Null));
    }

    #[test]
    fn test_missing_required_is_error() {
        let r = row(&[("Codice", "  "), ("Prezzo", "1")]);
        let report = validate_row(&r, &mapping(), &catalog());
        assert_eq!(report.errors.len(), 1);

        // 必填字段未映射同样是 error
        let unmapped: Mapping = [("Prezzo", "unit_price")].into_iter().collect();
        let report = validate_row(&r, &unmapped, &catalog());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_type_warnings_for_number_and_date() {
        let r = row(&[("Codice", "A1"), ("Peso", "heavy"), ("Data", "yesterday")]);
        let report = validate_row(&r, &mapping(), &catalog());
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_number_with_letters_warns() {
        for value in ["SKU12", "Rev-3", "abc 7 def"] {
            let r = row(&[("Codice", "A1"), ("Peso", value)]);
            let report = validate_row(&r, &mapping(), &catalog());
            assert_eq!(report.warnings.len(), 1, "{} 应给出 warning", value);
            assert!(report.errors.is_empty());
        }
        for value in ["1.234,56", "-3", "0,75"] {
            let r = row(&[("Codice", "A1"), ("Peso", value)]);
            assert!(validate_row(&r, &mapping(), &catalog()).is_clean(), "{}", value);
        }

        // 转换仍是尽力而为
        let r = row(&[("Codice", "A1"), ("Peso", "SKU12")]);
        let coerced = coerce_row(&r, &mapping(), &catalog());
        assert_eq!(coerced.get("weight"), Some(&TypedValue::Number(12.0)));
    }

    #[test]
    fn test_percentage_accepts_percent_sign() {
        let catalog = Arc::new(FieldCatalog::new(
            "discounts",
            vec![
                TargetField::new("rate", "折扣率", FieldType::Percentage),
                TargetField::new("weight", "重量", FieldType::Number),
            ],
        ));
        let mapping: Mapping = [("Sconto", "rate"), ("Peso", "weight")].into_iter().collect();

        let r = row(&[("Sconto", "15%"), ("Peso", "2")]);
        assert!(validate_row(&r, &mapping, &catalog).is_clean());

        let r = row(&[("Sconto", "15"), ("Peso", "15%")]);
        let report = validate_row(&r, &mapping, &catalog);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("重量"));
    }

    #[test]
    fn test_year_only_date_warns() {
        let r = row(&[("Codice", "A1"), ("Data", "2024")]);
        let report = validate_row(&r, &mapping(), &catalog());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            coerce_row(&r, &mapping(), &catalog()).get("launch_date"),
            Some(&TypedValue::Null)
        );
    }

    #[test]
    fn test_coerce_row_contains_every_catalog_field() {
        let r = row(&[("Codice", "A1")]);
        let coerced = coerce_row(&r, &mapping(), &catalog());
        assert_eq!(coerced.values.len(), 5);
        assert_eq!(coerced.get("active"), Some(&TypedValue::Null));
    }

    #[test]
    fn test_custom_fields_carried_when_allowed() {
        let validator = RowValidator::new(catalog()).with_custom_fields(true);
        let r = row(&[("Codice", "A1"), ("Colore", "rosso"), ("Vuoto", "")]);
        let coerced = validator.coerce_row(&r, &mapping());
        assert_eq!(coerced.custom_fields.get("Colore"), Some(&"rosso".to_string()));
        assert!(!coerced.custom_fields.contains_key("Vuoto"));

        let strict = RowValidator::new(catalog());
        assert!(strict.coerce_row(&r, &mapping()).custom_fields.is_empty());
    }

    #[test]
    fn test_validate_all_counts_and_truncation() {
        let table = ParsedTable {
            headers: vec!["Codice".into(), "Prezzo".into()],
            rows: vec![
                row(&[("Codice", "A1"), ("Prezzo", "1")]),
                row(&[("Codice", ""), ("Prezzo", "1")]),
                row(&[("Codice", "A3"), ("Prezzo", "x")]),
                row(&[("Codice", ""), ("Prezzo", "y")]),
            ],
        };
        let validator = RowValidator::new(catalog()).with_issue_limit(2);
        let summary = validator.validate_all(&table, &mapping());
        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.valid_rows, 1);
        assert_eq!(summary.warning_rows, 1);
        assert_eq!(summary.error_rows, 2);
        assert!(summary.has_errors());
        assert_eq!(summary.issues.len(), 2);
        assert!(summary.truncated);
        assert_eq!(summary.issues[0].row, 2);
        assert!(summary.issues[0].is_blocking());
    }

    #[test]
    fn test_duplicate_conflict_key_is_warning() {
        let table = ParsedTable {
            headers: vec!["Codice".into()],
            rows: vec![
                row(&[("Codice", "A1")]),
                row(&[("Codice", "a1")]),
            ],
        };
        let validator = RowValidator::new(catalog()).with_conflict_key(Some("sku".into()));
        let summary = validator.validate_all(&table, &mapping());
        assert_eq!(summary.error_rows, 0);
        assert_eq!(summary.warning_rows, 1);
        assert_eq!(summary.issues[0].row, 2);
        assert!(summary.issues[0].warnings[0].contains("第 1 行"));
    }
}
