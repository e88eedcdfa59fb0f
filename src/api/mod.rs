// ==========================================
// CRM 导入管道 - API 层
// ==========================================
// 职责: 提供导入业务接口,供 HTTP/命令处理器调用
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{CommitRequest, ImportApi, ImportPreviewResponse, RemapRequest, UploadRequest};
