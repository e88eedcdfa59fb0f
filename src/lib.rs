// ==========================================
// CRM 导入管道 - 核心库
// ==========================================
// 客户/订单表格（CSV/XLS/XLSX）批量导入与对账
// 上传 → 映射 → 校验/查重预览 → 提交 → 错误报告
// ==========================================

pub mod domain; // 实体与枚举
pub mod repository; // SQLite 记录存储
pub mod importer; // 管道各阶段
pub mod config; // 导入配置（config_kv）
pub mod db; // 连接与 schema
pub mod logging;
pub mod perf;
pub mod api; // 对外入口

pub use domain::types::{ImportStage, ImportTarget, MatchSource, SourceFormat};
pub use domain::{
    CommitResult, FieldError, FieldErrorKind, FieldMapping, FieldValue, ImportPreview,
    MappingOverride, NormalizedRecord, RawRow, RowOutcome,
};
pub use importer::{CrmImporter, CrmImporterImpl, ImportError, ImportResult};
pub use api::{ApiError, ImportApi};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = "CRM 导入管道";
