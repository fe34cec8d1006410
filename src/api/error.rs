// ==========================================
// 表格数据导入管道 - API层错误类型
// ==========================================
// 职责: 将导入层 / 仓储层错误转换为面向宿主的错误消息
// 所有错误信息必须包含显式原因
// ==========================================

use crate::importer::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 配置与输入错误
    // ==========================================
    #[error("配置错误: {0}")]
    ConfigurationError(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: step={step}, reason={reason}")]
    InvalidStateTransition { step: String, reason: String },

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("批次 {batch_index} 写入失败（此前已导入 {imported_so_far} 行）: {message}")]
    IngestionError {
        batch_index: usize,
        imported_so_far: usize,
        message: String,
    },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) | RepositoryError::StorageIoError(msg) => {
                ApiError::InternalError(msg)
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            e if e.is_parse_error() => ApiError::ImportError(e.to_string()),
            ImportError::IngestionError {
                batch_index,
                imported_so_far,
                message,
            } => ApiError::IngestionError {
                batch_index,
                imported_so_far,
                message,
            },
            ImportError::ConfigurationError(msg) => ApiError::ConfigurationError(msg),
            ImportError::StepBlocked { step, reason } => ApiError::InvalidStateTransition {
                step: step.to_string(),
                reason,
            },
            e @ (ImportError::ImportInProgress | ImportError::SessionClosed) => {
                ApiError::BusinessRuleViolation(e.to_string())
            }
            ImportError::StoreError(msg) => ApiError::DatabaseError(msg),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
