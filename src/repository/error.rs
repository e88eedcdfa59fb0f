// ==========================================
// CRM 导入管道 - 仓储层错误类型
// ==========================================
// 约束违反单独归类：提交阶段按行记录为 persistence 错误
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("记录未找到: {entity} with key={key}")]
    NotFound { entity: String, key: String },

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    /// 字段值无法写入存储（如标签列表序列化失败）
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },
}

impl RepositoryError {
    /// 单条记录层面的失败（其余行可继续写入）
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            RepositoryError::NotFound { .. }
                | RepositoryError::UniqueConstraintViolation(_)
                | RepositoryError::ForeignKeyViolation(_)
                | RepositoryError::FieldValueError { .. }
        )
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(failure, detail) = &err else {
            return RepositoryError::DatabaseQueryError(err.to_string());
        };
        let detail = detail.clone().unwrap_or_else(|| failure.to_string());

        match (failure.code, failure.extended_code) {
            (ErrorCode::ConstraintViolation, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
            | (ErrorCode::ConstraintViolation, rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                RepositoryError::UniqueConstraintViolation(detail)
            }
            (ErrorCode::ConstraintViolation, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                RepositoryError::ForeignKeyViolation(detail)
            }
            (ErrorCode::DatabaseBusy, _) | (ErrorCode::DatabaseLocked, _) => {
                RepositoryError::LockError(detail)
            }
            (ErrorCode::CannotOpen, _) => RepositoryError::DatabaseConnectionError(detail),
            _ => RepositoryError::DatabaseQueryError(detail),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
