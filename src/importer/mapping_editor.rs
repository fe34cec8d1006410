// ==========================================
// 表格数据导入管道 - 映射编辑器
// ==========================================
// 职责: 维护权威映射（自动映射建议 + 人工覆盖）
// 不变量: 任一目标字段至多一个源列；人工操作优先于自动建议
// ==========================================

use crate::domain::{FieldCatalog, Mapping, TargetField};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

// ==========================================
// 映射变更结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingChange {
    /// 已赋值；displaced 为被顶替的源列
    Assigned { displaced: Option<String> },
    /// 已清除该源列的映射
    Cleared,
    /// 与当前映射相同
    Unchanged,
    /// 未知源列或未知目标字段，映射不变
    Rejected,
}

impl MappingChange {
    pub fn is_change(&self) -> bool {
        matches!(self, MappingChange::Assigned { .. } | MappingChange::Cleared)
    }
}

// ==========================================
// 界面事件（拖放 / 下拉选择）到编辑器调用的适配
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingCommand {
    /// 源列拖放到目标字段
    Drop { source: String, target: String },
    /// 源列下拉选择（None = 不导入）
    Select { source: String, target: Option<String> },
    /// 清除源列映射
    Clear { source: String },
}

/// 单个目标字段的映射状态（用于已映射/未映射指示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMappingState {
    pub field: String,
    pub label: String,
    pub required: bool,
    pub source: Option<String>,
}

impl FieldMappingState {
    pub fn is_mapped(&self) -> bool {
        self.source.is_some()
    }
}

// ==========================================
// MappingEditor
// ==========================================
#[derive(Debug, Clone)]
pub struct MappingEditor {
    catalog: Arc<FieldCatalog>,
    headers: Vec<String>,
    mapping: Mapping,
    /// 人工操作过的源列
    manual_sources: HashSet<String>,
    /// 人工指定过的目标字段
    manual_targets: HashSet<String>,
    /// 每次有效变更 +1，依赖视图据此刷新
    revision: u64,
}

impl MappingEditor {
    pub fn new(catalog: Arc<FieldCatalog>, headers: Vec<String>) -> Self {
        Self {
            catalog,
            headers,
            mapping: Mapping::new(),
            manual_sources: HashSet::new(),
            manual_targets: HashSet::new(),
            revision: 0,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 应用自动映射建议
    ///
    /// 人工操作过的源列、人工指定过的目标字段均不被建议覆盖。
    /// 返回实际采纳的条目数。
    pub fn apply_proposal(&mut self, proposal: &Mapping) -> usize {
        let mut applied = 0;
        for (source, target) in proposal.iter() {
            if self.manual_sources.contains(source) || self.manual_targets.contains(target) {
                continue;
            }
            if !self.is_known_source(source) || !self.catalog.contains(target) {
                continue;
            }
            if self.mapping.target_of(source) == Some(target) {
                continue;
            }
            self.mapping.assign(source, target);
            applied += 1;
        }
        if applied > 0 {
            self.revision += 1;
        }
        debug!(applied, revision = self.revision, "自动映射建议已应用");
        applied
    }

    /// 人工设置映射（target 为 None 表示清除）
    ///
    /// 目标字段已被其他源列占用时，先解除旧源列。
    /// 未知目标字段或未知源列为静默无操作。
    pub fn set_mapping(&mut self, source: &str, target: Option<&str>) -> MappingChange {
        if !self.is_known_source(source) {
            return MappingChange::Rejected;
        }

        let change = match target {
            None => match self.mapping.unassign(source) {
                Some(_) => MappingChange::Cleared,
                None => MappingChange::Unchanged,
            },
            Some(field) => {
                if !self.catalog.contains(field) {
                    return MappingChange::Rejected;
                }
                if self.mapping.target_of(source) == Some(field) {
                    MappingChange::Unchanged
                } else {
                    let displaced = self.mapping.assign(source, field);
                    self.manual_targets.insert(field.to_string());
                    MappingChange::Assigned { displaced }
                }
            }
        };

        self.manual_sources.insert(source.to_string());
        if change.is_change() {
            self.revision += 1;
            debug!(source, target = ?target, revision = self.revision, "映射已更新");
        }
        change
    }

    /// 执行界面命令
    pub fn apply_command(&mut self, command: MappingCommand) -> MappingChange {
        match command {
            MappingCommand::Drop { source, target } => self.set_mapping(&source, Some(&target)),
            MappingCommand::Select { source, target } => {
                self.set_mapping(&source, target.as_deref())
            }
            MappingCommand::Clear { source } => self.set_mapping(&source, None),
        }
    }

    /// 清空全部映射与人工标记
    pub fn reset(&mut self) {
        self.mapping.clear();
        self.manual_sources.clear();
        self.manual_targets.clear();
        self.revision += 1;
    }

    pub fn is_manual(&self, source: &str) -> bool {
        self.manual_sources.contains(source)
    }

    /// 每个目标字段的映射状态（按目录顺序）
    pub fn field_states(&self) -> Vec<FieldMappingState> {
        self.catalog
            .fields()
            .iter()
            .map(|f| FieldMappingState {
                field: f.name.clone(),
                label: f.label.clone(),
                required: f.required,
                source: self.mapping.source_for(&f.name).map(str::to_string),
            })
            .collect()
    }

    /// 未映射的必填字段
    pub fn unmapped_required(&self) -> Vec<&TargetField> {
        self.catalog
            .required_fields()
            .filter(|f| self.mapping.source_for(&f.name).is_none())
            .collect()
    }

    /// 未映射的源列（按文件顺序）
    pub fn unmapped_sources(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| self.mapping.target_of(h).is_none())
            .map(String::as_str)
            .collect()
    }

    fn is_known_source(&self, source: &str) -> bool {
        self.headers.iter().any(|h| h == source)
    }
}
