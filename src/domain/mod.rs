// ==========================================
// CRM 导入管道 - 领域模型层
// ==========================================
// 职责: 定义导入管道的实体与类型
// 红线: 不含数据访问逻辑,不含管道逻辑
// ==========================================

pub mod import;
pub mod record;
pub mod types;

// 重导出核心类型
pub use import::{
    CommitResult, FieldError, FieldErrorKind, FieldMapping, ImportBatch, ImportPreview,
    MappingOverride, RowOutcome,
};
pub use record::{ExtractedSheet, FieldValue, NormalizedRecord, RawRow};
pub use types::{ImportStage, ImportTarget, MatchSource, SourceFormat};
