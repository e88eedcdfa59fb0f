// ==========================================
// CRM 导入管道 - 导入器 Trait
// ==========================================
// 职责: 定义导入管道主接口（预览 / 重新映射 / 提交）
// ==========================================

use crate::domain::import::{CommitResult, ImportPreview, MappingOverride};
use crate::domain::types::ImportTarget;
use crate::importer::error::ImportResult;
use async_trait::async_trait;

/// 上传的文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub media_type: String,
    pub payload: Vec<u8>,
}

// ==========================================
// CrmImporter Trait
// ==========================================
// 用途: 客户/订单表格导入主接口
// 实现者: CrmImporterImpl
#[async_trait]
pub trait CrmImporter: Send + Sync {
    /// 解析上传文件并生成预览
    ///
    /// # 流程
    /// 1. 大小/格式检查 + 行提取
    /// 2. 建议映射
    /// 3. 行校验
    /// 4. 重复检测（文件内 + 已有记录）
    /// 5. 暂存并返回预览
    ///
    /// # 返回
    /// - Err: 文件本身无效或持久层查重失败（无任何暂存）
    async fn preview(&self, upload: UploadedFile, target: ImportTarget)
        -> ImportResult<ImportPreview>;

    /// 按操作员调整后的映射重新生成预览
    ///
    /// 原预览作废，返回新的 preview_id
    async fn remap(
        &self,
        preview_id: &str,
        overrides: &[MappingOverride],
    ) -> ImportResult<ImportPreview>;

    /// 提交预览（同一预览最多提交一次）
    async fn commit(&self, preview_id: &str, upsert: bool) -> ImportResult<CommitResult>;
}
