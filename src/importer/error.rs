// ==========================================
// CRM 导入管道 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 本枚举只承载“整个请求失败”的错误；
//       行级问题一律以 FieldError 值返回，不经过此类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件格式不支持: {0}（仅支持 .csv/.xls/.xlsx）")]
    UnsupportedFormat(String),

    #[error("文件过大: {size} 字节，上限 {limit} 字节")]
    FileTooLarge { size: usize, limit: usize },

    #[error("文件解析失败: {0}")]
    ParseError(String),

    // ===== 映射错误 =====
    #[error("未知的源列: {0}")]
    UnknownColumn(String),

    #[error("映射下标越界: index={index}, len={len}")]
    MappingIndexOutOfRange { index: usize, len: usize },

    // ===== 预览生命周期错误 =====
    #[error("预览不存在: {0}")]
    PreviewNotFound(String),

    #[error("预览已过期: {0}")]
    PreviewExpired(String),

    #[error("预览已提交: {0}")]
    PreviewAlreadyConsumed(String),

    #[error("无效的阶段转换: from={from} to={to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("必填字段未映射，无法提交: {}", .0.join(", "))]
    RequiredFieldsUnmapped(Vec<String>),

    // ===== 协作方错误 =====
    #[error("持久层错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("配置读取失败 (key: {key}): {message}")]
    Config { key: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ImportError {
    /// 文件或预览本身无效，未产生任何副作用
    pub fn is_fatal_to_import(&self) -> bool {
        matches!(
            self,
            ImportError::UnsupportedFormat(_)
                | ImportError::FileTooLarge { .. }
                | ImportError::ParseError(_)
                | ImportError::PreviewNotFound(_)
                | ImportError::PreviewExpired(_)
                | ImportError::PreviewAlreadyConsumed(_)
        )
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::ParseError(format!("CSV: {}", err))
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ParseError(format!("Excel: {}", err))
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
