// ==========================================
// CRM 导入管道 - 记录持久化 Repository Trait
// ==========================================
// 职责: 定义导入管道所需的持久层协作方接口
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::import::ImportBatch;
use crate::domain::record::NormalizedRecord;
use crate::domain::types::ImportTarget;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashSet;

// ==========================================
// RecordRepository Trait
// ==========================================
// 用途: 客户/订单按自然键查重与写入
// 实现者: SqliteRecordRepository（使用 rusqlite）
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// 自然键是否已存在
    async fn exists_by_key(&self, target: ImportTarget, key: &str) -> RepositoryResult<bool>;

    /// 批量查询已存在的自然键（一次往返）
    ///
    /// # 返回
    /// keys 中已持久化的子集
    async fn find_existing_keys(
        &self,
        target: ImportTarget,
        keys: &[String],
    ) -> RepositoryResult<HashSet<String>>;

    /// 新建记录
    async fn create_record(&self, record: &NormalizedRecord) -> RepositoryResult<()>;

    /// 按自然键更新记录（只覆盖 record 中出现的字段）
    ///
    /// # 返回
    /// - Err(NotFound): 键不存在
    async fn update_record_by_key(&self, key: &str, record: &NormalizedRecord)
        -> RepositoryResult<()>;

    /// 写入提交批次审计记录
    async fn insert_import_batch(&self, batch: &ImportBatch) -> RepositoryResult<()>;

    /// 统计已持久化记录数
    async fn count_records(&self, target: ImportTarget) -> RepositoryResult<usize>;
}
