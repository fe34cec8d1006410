// ==========================================
// 表格数据导入管道 - 映射模板存储
// ==========================================
// 存储: 本地 JSON 文件（默认位于用户数据目录）
// 约定: (name, entity) 唯一；同名保存即覆盖
// ==========================================

use crate::domain::MappingTemplate;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const APP_DIR: &str = "tabular-import";
const TEMPLATE_FILE: &str = "mapping_templates.json";

pub struct TemplateStore {
    path: PathBuf,
    // 串行化读-改-写
    guard: Mutex<()>,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// 默认存储路径：<data_local_dir>/tabular-import/mapping_templates.json
    pub fn default_path() -> RepositoryResult<PathBuf> {
        let base = dirs::data_local_dir().ok_or_else(|| {
            RepositoryError::StorageIoError("无法确定本地数据目录".to_string())
        })?;
        Ok(base.join(APP_DIR).join(TEMPLATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> RepositoryResult<Vec<MappingTemplate>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn persist(&self, templates: &[MappingTemplate]) -> RepositoryResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(templates)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// 列出某实体的模板（按名称排序）
    pub fn list(&self, entity: &str) -> RepositoryResult<Vec<MappingTemplate>> {
        let _lock = self.guard.lock()?;
        let mut templates: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|t| t.entity == entity)
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    pub fn get(&self, name: &str, entity: &str) -> RepositoryResult<Option<MappingTemplate>> {
        let _lock = self.guard.lock()?;
        Ok(self
            .load()?
            .into_iter()
            .find(|t| t.name == name && t.entity == entity))
    }

    /// 保存模板；已存在同名同实体模板时覆盖
    pub fn save(&self, template: MappingTemplate) -> RepositoryResult<()> {
        if template.name.trim().is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "name".to_string(),
                message: "模板名称不能为空".to_string(),
            });
        }

        let _lock = self.guard.lock()?;
        let mut templates = self.load()?;
        templates.retain(|t| !(t.name == template.name && t.entity == template.entity));
        debug!(name = %template.name, entity = %template.entity, "保存映射模板");
        templates.push(template);
        self.persist(&templates)
    }

    /// 删除模板；返回是否存在
    pub fn delete(&self, name: &str, entity: &str) -> RepositoryResult<bool> {
        let _lock = self.guard.lock()?;
        let mut templates = self.load()?;
        let before = templates.len();
        templates.retain(|t| !(t.name == name && t.entity == entity));
        if templates.len() == before {
            warn!(name, entity, "映射模板不存在");
            return Ok(false);
        }
        self.persist(&templates)?;
        Ok(true)
    }
}
