// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、Mock 仓储、Mock 配置与上传文件构造
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use crm_import::config::{defaults, ConfigReadError, ImportConfigReader};
use crm_import::db::{init_schema, open_sqlite_connection};
use crm_import::domain::{ImportBatch, ImportTarget, NormalizedRecord};
use crm_import::importer::{SchemaRegistry, UploadedFile};
use crm_import::repository::{RecordRepository, RepositoryError, RepositoryResult};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("临时路径非 UTF-8")?.to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（仓储与配置共用）
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    let conn = open_sqlite_connection(db_path).expect("打开测试数据库失败");
    Arc::new(Mutex::new(conn))
}

/// 构造 CSV 上传
pub fn csv_upload(file_name: &str, content: &str) -> UploadedFile {
    UploadedFile {
        file_name: file_name.to_string(),
        media_type: "text/csv".to_string(),
        payload: content.as_bytes().to_vec(),
    }
}

/// 三行客户文件：第 2 行与第 1 行电话重复，第 3 行电话已在库中
pub const CUSTOMERS_CSV: &str = "姓名,电话,邮箱\n\
王小明,0912345678,ming@example.com\n\
王大明,0912345678,da@example.com\n\
李四,0900000000,lisi@example.com\n";

// ==========================================
// Mock 配置
// ==========================================

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub max_file_size_bytes: usize,
    pub preview_ttl_secs: u64,
    pub commit_concurrency: usize,
    pub fuzzy_match_threshold: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: defaults::MAX_FILE_SIZE_BYTES,
            preview_ttl_secs: defaults::PREVIEW_TTL_SECS,
            commit_concurrency: defaults::COMMIT_CONCURRENCY,
            fuzzy_match_threshold: defaults::FUZZY_MATCH_THRESHOLD,
        }
    }
}

impl MockConfig {
    /// 指定文件大小上限
    pub fn with_max_file_size(max_file_size_bytes: usize) -> Self {
        Self {
            max_file_size_bytes,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ImportConfigReader for MockConfig {
    async fn get_max_file_size_bytes(&self) -> Result<usize, ConfigReadError> {
        Ok(self.max_file_size_bytes)
    }

    async fn get_preview_ttl_secs(&self) -> Result<u64, ConfigReadError> {
        Ok(self.preview_ttl_secs)
    }

    async fn get_commit_concurrency(&self) -> Result<usize, ConfigReadError> {
        Ok(self.commit_concurrency)
    }

    async fn get_fuzzy_match_threshold(&self) -> Result<f64, ConfigReadError> {
        Ok(self.fuzzy_match_threshold)
    }
}

// ==========================================
// Mock 仓储（内存实现，可注入单键写入失败）
// ==========================================

#[derive(Default)]
pub struct MockRecordRepository {
    records: Mutex<HashMap<(ImportTarget, String), NormalizedRecord>>,
    batches: Mutex<Vec<ImportBatch>>,
    fail_keys: Mutex<HashSet<String>>,
    writes: AtomicUsize,
    lookups: AtomicUsize,
    lookup_budget: Mutex<Option<usize>>,
}

impl MockRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置已存在的记录
    pub fn seed(&self, record: NormalizedRecord) {
        let key = record_key(&record);
        self.records
            .lock()
            .unwrap()
            .insert((record.target, key), record);
    }

    /// 对该自然键的写入返回失败
    pub fn fail_on(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    /// 前 n 次批量查重成功，之后返回连接错误
    pub fn fail_lookups_after(&self, n: usize) {
        *self.lookup_budget.lock().unwrap() = Some(n);
    }

    pub fn get(&self, target: ImportTarget, key: &str) -> Option<NormalizedRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(target, key.to_string()))
            .cloned()
    }

    pub fn batches(&self) -> Vec<ImportBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// 成功 + 失败的写入尝试次数
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_injected(&self, key: &str) -> RepositoryResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_keys.lock().unwrap().contains(key) {
            return Err(RepositoryError::DatabaseQueryError(format!(
                "注入的写入失败: {}",
                key
            )));
        }
        Ok(())
    }
}

fn record_key(record: &NormalizedRecord) -> String {
    SchemaRegistry::schema_for(record.target)
        .key_of(record)
        .unwrap_or_default()
}

#[async_trait]
impl RecordRepository for MockRecordRepository {
    async fn exists_by_key(&self, target: ImportTarget, key: &str) -> RepositoryResult<bool> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .contains_key(&(target, key.to_string())))
    }

    async fn find_existing_keys(
        &self,
        target: ImportTarget,
        keys: &[String],
    ) -> RepositoryResult<HashSet<String>> {
        let call = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(budget) = *self.lookup_budget.lock().unwrap() {
            if call > budget {
                return Err(RepositoryError::DatabaseConnectionError(
                    "查重连接中断".to_string(),
                ));
            }
        }

        let records = self.records.lock().unwrap();
        Ok(keys
            .iter()
            .filter(|k| records.contains_key(&(target, (*k).clone())))
            .cloned()
            .collect())
    }

    async fn create_record(&self, record: &NormalizedRecord) -> RepositoryResult<()> {
        let key = record_key(record);
        self.check_injected(&key)?;

        let mut records = self.records.lock().unwrap();
        let slot = (record.target, key.clone());
        if records.contains_key(&slot) {
            return Err(RepositoryError::UniqueConstraintViolation(key));
        }
        records.insert(slot, record.clone());
        Ok(())
    }

    async fn update_record_by_key(
        &self,
        key: &str,
        record: &NormalizedRecord,
    ) -> RepositoryResult<()> {
        self.check_injected(key)?;

        let mut records = self.records.lock().unwrap();
        let existing = records
            .get_mut(&(record.target, key.to_string()))
            .ok_or_else(|| RepositoryError::NotFound {
                entity: record.target.to_string(),
                key: key.to_string(),
            })?;
        for (field, value) in &record.fields {
            existing.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn insert_import_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn count_records(&self, target: ImportTarget) -> RepositoryResult<usize> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| *t == target)
            .count())
    }
}
