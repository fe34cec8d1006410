// ==========================================
// 表格数据导入管道 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 解析错误（致命,映射前）/ 入库错误（致命,导入中）/ 配置错误（致命,导入前）
// 行级 error/warning 不走此类型，汇总展示
// ==========================================

use crate::domain::types::WizardStep;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件解析错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .csv/.xlsx/.xls）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件为空或缺少数据行: {0}")]
    EmptyFile(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    // ===== 入库错误 =====
    #[error("批次 {batch_index} 写入失败（此前已导入 {imported_so_far} 行）: {message}")]
    IngestionError {
        batch_index: usize,
        imported_so_far: usize,
        message: String,
    },

    #[error("记录存储错误: {0}")]
    StoreError(String),

    // ===== 配置错误 =====
    #[error("配置错误: {0}")]
    ConfigurationError(String),

    // ===== 向导流程错误 =====
    #[error("无法离开步骤 {step}: {reason}")]
    StepBlocked { step: WizardStep, reason: String },

    #[error("导入已开始，不可返回或重复执行")]
    ImportInProgress,

    #[error("导入会话已关闭")]
    SessionClosed,

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否属于文件解析类错误（会话停留在 upload 步骤）
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::EmptyFile(_)
                | ImportError::CsvParseError(_)
                | ImportError::ExcelParseError(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ImportError::FileNotFound(err.to_string()),
            _ => ImportError::FileReadError(err.to_string()),
        }
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<RepositoryError>：存储层消息原样透出
impl From<crate::repository::RepositoryError> for ImportError {
    fn from(err: crate::repository::RepositoryError) -> Self {
        ImportError::StoreError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
