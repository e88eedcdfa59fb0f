// ==========================================
// CRM 导入管道 - API层错误类型
// ==========================================
// 职责: 将导入层/仓储层错误转换为带稳定错误码的用户友好错误
// 说明: 行级问题不走此类型，均以 FieldError 值出现在预览/提交结果中
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 文件错误（未产生任何副作用）
    // ==========================================
    #[error("文件格式不支持: {0}")]
    UnsupportedFormat(String),

    #[error("文件过大: {size} 字节，上限 {limit} 字节")]
    FileTooLarge { size: usize, limit: usize },

    #[error("文件解析失败: {0}")]
    ParseError(String),

    // ==========================================
    // 映射调整错误
    // ==========================================
    #[error("未知的源列: {0}")]
    UnknownColumn(String),

    #[error("映射下标越界: index={index}, len={len}")]
    MappingIndexOutOfRange { index: usize, len: usize },

    // ==========================================
    // 预览生命周期错误
    // ==========================================
    #[error("预览不存在: {0}")]
    PreviewNotFound(String),

    #[error("预览已过期: {0}")]
    PreviewExpired(String),

    #[error("预览已提交: {0}")]
    PreviewAlreadyConsumed(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("必填字段未映射: {}", .0.join(", "))]
    RequiredFieldsUnmapped(Vec<String>),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    /// 前端使用的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ApiError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ApiError::ParseError(_) => "PARSE_ERROR",
            ApiError::UnknownColumn(_) => "UNKNOWN_COLUMN",
            ApiError::MappingIndexOutOfRange { .. } => "MAPPING_INDEX_OUT_OF_RANGE",
            ApiError::PreviewNotFound(_) => "PREVIEW_NOT_FOUND",
            ApiError::PreviewExpired(_) => "PREVIEW_EXPIRED",
            ApiError::PreviewAlreadyConsumed(_) => "PREVIEW_ALREADY_CONSUMED",
            ApiError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            ApiError::RequiredFieldsUnmapped(_) => "REQUIRED_FIELDS_UNMAPPED",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::DatabaseError(_) | ApiError::DatabaseConnectionError(_) => "DATABASE_ERROR",
            ApiError::ConfigError(_) => "CONFIG_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// 文件或预览本身无效：请求被拒绝，存储未发生任何变化
    pub fn is_fatal_to_import(&self) -> bool {
        matches!(
            self,
            ApiError::UnsupportedFormat(_)
                | ApiError::FileTooLarge { .. }
                | ApiError::ParseError(_)
                | ApiError::PreviewNotFound(_)
                | ApiError::PreviewExpired(_)
                | ApiError::PreviewAlreadyConsumed(_)
        )
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::UnsupportedFormat(msg) => ApiError::UnsupportedFormat(msg),
            ImportError::FileTooLarge { size, limit } => ApiError::FileTooLarge { size, limit },
            ImportError::ParseError(msg) => ApiError::ParseError(msg),
            ImportError::UnknownColumn(col) => ApiError::UnknownColumn(col),
            ImportError::MappingIndexOutOfRange { index, len } => {
                ApiError::MappingIndexOutOfRange { index, len }
            }
            ImportError::PreviewNotFound(id) => ApiError::PreviewNotFound(id),
            ImportError::PreviewExpired(id) => ApiError::PreviewExpired(id),
            ImportError::PreviewAlreadyConsumed(id) => ApiError::PreviewAlreadyConsumed(id),
            ImportError::InvalidStageTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            ImportError::RequiredFieldsUnmapped(fields) => ApiError::RequiredFieldsUnmapped(fields),
            ImportError::Repository(repo_err) => repo_err.into(),
            ImportError::Config { key, message } => {
                ApiError::ConfigError(format!("{}: {}", key, message))
            }
            ImportError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, key } => {
                ApiError::NotFound(format!("{}(key={})不存在", entity, key))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
