// ==========================================
// 表格数据导入管道 - 列名归一化与自动映射
// ==========================================
// 职责: 源列名 → 目标字段 的启发式建议
// 规则: 小写 + 仅保留 [a-z0-9]，模式为表头的子串即命中
//       按模式表顺序、模式顺序取第一个命中，不打分
// ==========================================

use crate::domain::{FieldCatalog, Mapping, PatternTable};
use tracing::debug;

/// 归一化：小写并剔除所有非 [a-z0-9] 字符
pub fn normalize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// 为单个表头找到第一个命中的目标字段
pub fn match_header<'a>(header: &str, patterns: &'a PatternTable) -> Option<&'a str> {
    let normalized_header = normalize(header);
    if normalized_header.is_empty() {
        return None;
    }

    patterns
        .iter()
        .find(|entry| {
            entry.patterns.iter().any(|pattern| {
                let p = normalize(pattern);
                !p.is_empty() && normalized_header.contains(&p)
            })
        })
        .map(|entry| entry.field.as_str())
}

/// 自动映射（纯函数，幂等）
///
/// 表头按文件顺序处理；同一目标字段被多个表头命中时保留先出现的表头，
/// 以满足映射唯一性不变量。未命中的表头不出现在结果中。
pub fn auto_map(headers: &[String], patterns: &PatternTable) -> Mapping {
    let mut mapping = Mapping::new();

    for header in headers {
        if mapping.target_of(header).is_some() {
            continue; // 重复表头
        }
        if let Some(field) = match_header(header, patterns) {
            if mapping.source_for(field).is_none() {
                mapping.assign(header, field);
            }
        }
    }

    debug!(headers = headers.len(), mapped = mapping.len(), "自动映射完成");
    mapping
}

/// 由字段目录派生最小模式表（字段名 + 显示名），用于无内置模式表的自定义实体
pub fn patterns_from_catalog(catalog: &FieldCatalog) -> PatternTable {
    catalog
        .fields()
        .iter()
        .map(|f| crate::domain::FieldPatterns {
            field: f.name.clone(),
            patterns: vec![f.name.clone(), f.label.clone()],
        })
        .collect()
}
