// ==========================================
// CRM 导入管道 - 导入层
// ==========================================
// 职责: 客户/订单表格导入（预览 → 调整映射 → 提交 → 错误报告）
// 支持: CSV, XLS, XLSX
// ==========================================

// 模块声明
pub mod commit_executor;
pub mod crm_importer_impl;
pub mod crm_importer_trait;
pub mod duplicate_resolver;
pub mod error;
pub mod error_reporter;
pub mod field_mapper;
pub mod file_parser;
pub mod preview_store;
pub mod row_validator;
pub mod schema;

// 重导出核心类型
pub use commit_executor::CommitExecutor;
pub use crm_importer_impl::CrmImporterImpl;
pub use duplicate_resolver::DuplicateResolver;
pub use error::{ImportError, ImportResult};
pub use error_reporter::{ErrorReport, ErrorReporter};
pub use field_mapper::{unmapped_required, FieldMapper};
pub use file_parser::{CsvParser, ExcelParser, SheetParser, UniversalFileParser};
pub use preview_store::{PreviewStore, StagedImport};
pub use row_validator::RowValidator;
pub use schema::{canonical_key, FieldKind, FieldSpec, SchemaRegistry, TargetSchema};

// 重导出 Trait 接口
pub use crm_importer_trait::{CrmImporter, UploadedFile};
