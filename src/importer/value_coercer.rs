// ==========================================
// 表格数据导入管道 - 值类型转换
// ==========================================
// 职责: 原始字符串 → 目标字段类型的尽力转换
// 红线: 全函数，任何输入都不 panic、不返回错误；失败即 Null
// ==========================================

use crate::domain::{FieldType, TargetField, TypedValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// 布尔真值集合（小写比较）
pub const TRUE_LITERALS: [&str; 4] = ["true", "1", "yes", "si"];

/// 可识别的布尔假值（仅用于校验提示）
pub const FALSE_LITERALS: [&str; 4] = ["false", "0", "no", "n"];

/// 数值解析：仅保留数字、'.'、','、'-'，兼容欧式小数逗号与千分位
///
/// - 同时含 '.' 与 ','：靠后者为小数点，另一者视为千分位
/// - 仅含 ','：单个为小数点，多个为千分位
/// - 仅含多个 '.'：视为千分位
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (None, Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// 严格数值判定（校验用）：可选前导符号，其余只能是数字与 '.'、','
///
/// percent 为 true 时允许末尾 '%'。转换仍走宽松的 parse_number。
pub fn is_plain_number(raw: &str, percent: bool) -> bool {
    let mut value = raw.trim();
    if percent {
        value = value.strip_suffix('%').map_or(value, str::trim_end);
    }
    let body = value.strip_prefix(['-', '+']).unwrap_or(value);

    !body.is_empty()
        && body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        && parse_number(body).is_some()
}

/// 日期解析：先尝试 ISO 等标准格式，再尝试 DD/MM/YYYY
///
/// 纯数字不按 Excel 序列日解释；Excel 日期单元格由转换器输出为 ISO 文本。
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    // 标准格式
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }

    // 显式 DD/MM/YYYY（兼容 '-' 与 '.' 分隔）
    for fmt in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d);
        }
    }

    None
}

pub fn parse_boolean(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    TRUE_LITERALS.contains(&lower.as_str())
}

/// 是否为可识别的布尔字面量（真或假）
pub fn is_boolean_literal(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    TRUE_LITERALS.contains(&lower.as_str()) || FALSE_LITERALS.contains(&lower.as_str())
}

/// select 选项匹配（忽略大小写），返回规范写法
pub fn match_option<'a>(raw: &str, options: &'a [String]) -> Option<&'a str> {
    let value = raw.trim();
    options
        .iter()
        .find(|o| o.eq_ignore_ascii_case(value) || o.to_lowercase() == value.to_lowercase())
        .map(String::as_str)
}

/// 按字段类型转换单元格
///
/// 空值无条件转为 Null，优先于任何类型解析。
pub fn coerce_value(raw: &str, field: &TargetField) -> TypedValue {
    let value = raw.trim();
    if value.is_empty() {
        return TypedValue::Null;
    }

    match field.field_type {
        FieldType::Text => TypedValue::Text(value.to_string()),
        FieldType::Number | FieldType::Currency | FieldType::Percentage => {
            parse_number(value).map_or(TypedValue::Null, TypedValue::Number)
        }
        FieldType::Date => parse_date(value).map_or(TypedValue::Null, |d| {
            TypedValue::Text(d.format("%Y-%m-%d").to_string())
        }),
        FieldType::Boolean => TypedValue::Bool(parse_boolean(value)),
        FieldType::Select => match match_option(value, &field.options) {
            Some(canonical) => TypedValue::Text(canonical.to_string()),
            None => TypedValue::Text(value.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(field_type: FieldType) -> TargetField {
        TargetField::new("f", "F", field_type)
    }

    #[test]
    fn test_parse_number_formats() {
        assert_eq!(parse_number("12,50€"), Some(12.5));
        assert_eq!(parse_number("€ 1.234,56"), Some(1234.56));
        assert_eq!(parse_number("$1,234.56"), Some(1234.56));
        assert_eq!(parse_number("1,234,567"), Some(1234567.0));
        assert_eq!(parse_number("1.234.567"), Some(1234567.0));
        assert_eq!(parse_number("-3.5"), Some(-3.5));
        assert_eq!(parse_number("15%"), Some(15.0));
        assert_eq!(parse_number("42"), Some(42.0));
    }

    #[test]
    fn test_parse_number_failures_are_none() {
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("--"), None);
        assert_eq!(parse_number("1-2"), None);
        assert_eq!(parse_number(",."), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date("2024-03-15"), expected);
        assert_eq!(parse_date("2024/03/15"), expected);
        assert_eq!(parse_date("20240315"), expected);
        assert_eq!(parse_date("2024-03-15T10:30:00Z"), expected);
        assert_eq!(parse_date("2024-03-15 10:30:00"), expected);
        assert_eq!(parse_date("15/03/2024"), expected);
        assert_eq!(parse_date("15.03.2024"), expected);
    }

    #[test]
    fn test_parse_date_failures_are_none() {
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("domani"), None);
        assert_eq!(parse_date("0"), None);
        // 纯年份或序列日数字不是日期
        assert_eq!(parse_date("2024"), None);
        assert_eq!(parse_date("45366"), None);
        assert_eq!(coerce_value("2024", &field(FieldType::Date)), TypedValue::Null);
    }

    #[test]
    fn test_plain_number_is_strict() {
        for v in ["42", "-3", "+7", "1.234,56", "1,234.56", " 0,5 "] {
            assert!(is_plain_number(v, false), "{} 应为数值", v);
        }
        for v in ["SKU12", "Rev-3", "abc 7 def", "12kg", "n/a", "-", "15%"] {
            assert!(!is_plain_number(v, false), "{} 不应为数值", v);
        }
        assert!(is_plain_number("15%", true));
        assert!(is_plain_number("-2,5 %", true));
        assert!(!is_plain_number("%", true));
    }

    #[test]
    fn test_boolean_literals() {
        for v in ["true", "TRUE", "1", "Yes", "si", " SI "] {
            assert!(parse_boolean(v), "{} 应为 true", v);
        }
        for v in ["false", "0", "no", "sì", "y", "x"] {
            assert!(!parse_boolean(v), "{} 应为 false", v);
        }
        assert!(is_boolean_literal("No"));
        assert!(!is_boolean_literal("forse"));
    }

    #[test]
    fn test_coerce_empty_is_null_for_every_type() {
        for t in [
            FieldType::Text,
            FieldType::Number,
            FieldType::Date,
            FieldType::Boolean,
            FieldType::Currency,
            FieldType::Percentage,
            FieldType::Select,
        ] {
            assert_eq!(coerce_value("   ", &field(t)), TypedValue::Null);
        }
    }

    #[test]
    fn test_coerce_values() {
        assert_eq!(
            coerce_value("12,50€", &field(FieldType::Currency)),
            TypedValue::Number(12.5)
        );
        assert_eq!(coerce_value("n/a", &field(FieldType::Currency)), TypedValue::Null);
        assert_eq!(
            coerce_value("15/03/2024", &field(FieldType::Date)),
            TypedValue::Text("2024-03-15".into())
        );
        assert_eq!(coerce_value("boh", &field(FieldType::Date)), TypedValue::Null);
        assert_eq!(coerce_value("si", &field(FieldType::Boolean)), TypedValue::Bool(true));
        assert_eq!(
            coerce_value("  Widget ", &field(FieldType::Text)),
            TypedValue::Text("Widget".into())
        );
    }

    #[test]
    fn test_coerce_select_canonical_option() {
        let f = TargetField::new("status", "状态", FieldType::Select)
            .with_options(&["In Transit", "Delivered"]);
        assert_eq!(coerce_value("in transit", &f), TypedValue::Text("In Transit".into()));
        assert_eq!(coerce_value("Lost", &f), TypedValue::Text("Lost".into()));
    }

    #[test]
    fn test_coerce_never_panics_on_odd_input() {
        let huge = "9".repeat(400);
        let inputs = ["\u{0}", "💥", "-", "....", ",,,,", "1.2.3,4,5", huge.as_str()];
        for raw in inputs {
            for t in [FieldType::Number, FieldType::Date, FieldType::Currency, FieldType::Percentage] {
                let _ = coerce_value(raw, &field(t));
            }
        }
        // 溢出为无穷大时视为失败
        assert_eq!(coerce_value(&huge, &field(FieldType::Number)), TypedValue::Null);
    }
}
