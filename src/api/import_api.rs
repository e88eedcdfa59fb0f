// ==========================================
// CRM 导入 API
// ==========================================
// 职责: 导入向导背后的服务边界（上传预览 / 调整映射 / 提交 / 错误报告）
// 请求与响应结构体以 camelCase 序列化
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::import::{CommitResult, FieldError, ImportPreview, MappingOverride};
use crate::domain::types::ImportTarget;
use crate::importer::{CrmImporter, CrmImporterImpl, ErrorReport, ErrorReporter, UploadedFile};
use crate::perf::{install_sqlite_tracing, PerfGuard};
use crate::repository::SqliteRecordRepository;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// 预览响应（上传与重新映射共用）
pub type ImportPreviewResponse = ImportPreview;

/// 上传预览请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub media_type: String,
    pub payload: Vec<u8>,
    pub target: ImportTarget,
}

/// 重新映射请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapRequest {
    pub preview_id: String,
    #[serde(default)]
    pub overrides: Vec<MappingOverride>,
}

/// 提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub preview_id: String,
    #[serde(default)]
    pub upsert: bool,
}

/// 导入API
pub struct ImportApi {
    importer: Arc<dyn CrmImporter>,
}

impl ImportApi {
    /// 使用已组装的导入器创建
    pub fn new(importer: Arc<dyn CrmImporter>) -> Self {
        Self { importer }
    }

    /// 打开数据库并组装默认导入器（SQLite 仓储 + config_kv 配置）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub async fn open(db_path: &str) -> ApiResult<Self> {
        let mut conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        install_sqlite_tracing(&mut conn);
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        info!(db_path, "导入服务数据库已就绪");
        Self::from_connection(Arc::new(Mutex::new(conn))).await
    }

    /// 基于共享连接组装默认导入器（调用方负责建表）
    pub async fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        let config = ConfigManager::from_connection(conn.clone())
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let repo = SqliteRecordRepository::from_connection(conn);
        let importer = CrmImporterImpl::new(repo, config).await?;
        Ok(Self::new(Arc::new(importer)))
    }

    /// 上传文件并生成预览
    ///
    /// # 返回
    /// - Ok(ImportPreviewResponse): 预览（含建议映射、行级错误与计数）
    /// - Err(ApiError): 文件无效（格式/大小/解析）或查重失败，未暂存任何内容
    pub async fn upload_preview(&self, req: UploadRequest) -> ApiResult<ImportPreviewResponse> {
        let _perf = PerfGuard::new("api.upload_preview");

        if req.file_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件名不能为空".to_string()));
        }

        let upload = UploadedFile {
            file_name: req.file_name,
            media_type: req.media_type,
            payload: req.payload,
        };
        Ok(self.importer.preview(upload, req.target).await?)
    }

    /// 按操作员调整的映射重新生成预览（原预览作废）
    pub async fn remap_preview(&self, req: RemapRequest) -> ApiResult<ImportPreviewResponse> {
        let _perf = PerfGuard::new("api.remap_preview");
        let preview_id = require_preview_id(&req.preview_id)?;
        Ok(self.importer.remap(preview_id, &req.overrides).await?)
    }

    /// 提交预览
    ///
    /// # 返回
    /// - Ok(CommitResult): 各计数与行级错误（单行失败不影响其他行）
    /// - Err(ApiError): 预览不存在/已过期/已提交，存储未发生变化
    pub async fn commit(&self, req: CommitRequest) -> ApiResult<CommitResult> {
        let _perf = PerfGuard::new("api.commit");
        let preview_id = require_preview_id(&req.preview_id)?;
        Ok(self.importer.commit(preview_id, req.upsert).await?)
    }

    /// 将行级错误导出为 CSV 报告
    pub fn export_error_report(
        &self,
        file_name: &str,
        errors: &[FieldError],
    ) -> ApiResult<ErrorReport> {
        let _perf = PerfGuard::new("api.export_error_report");
        Ok(ErrorReporter::render_csv(errors, file_name)?)
    }
}

fn require_preview_id(preview_id: &str) -> ApiResult<&str> {
    let trimmed = preview_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput("previewId 不能为空".to_string()));
    }
    Ok(trimmed)
}
