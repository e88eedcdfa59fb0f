// ==========================================
// CRM 导入管道 - Commit Executor（提交执行器）
// ==========================================
// 职责: 消费预览 → 按行生成写入计划 → 有界并发写入 → 汇总 CommitResult
// 红线:
// - 预览消费失败即整体失败，无任何写入
// - 单行写入失败只记为该行错误，不影响其它行
// - successful + ignored + error + duplicates_handled = total
// ==========================================

use crate::domain::import::{CommitResult, FieldError, ImportBatch, RowOutcome};
use crate::domain::record::NormalizedRecord;
use crate::domain::types::MatchSource;
use crate::importer::error::ImportResult;
use crate::importer::preview_store::PreviewStore;
use crate::importer::schema::SchemaRegistry;
use crate::repository::error::RepositoryError;
use crate::repository::record_repo::RecordRepository;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{error, info, warn};

/// 单行写入计划
#[derive(Debug)]
enum PlannedWrite {
    Create(NormalizedRecord),
    Update { key: String, record: NormalizedRecord },
}

impl PlannedWrite {
    fn row_number(&self) -> usize {
        match self {
            PlannedWrite::Create(record) => record.row_number,
            PlannedWrite::Update { record, .. } => record.row_number,
        }
    }
}

/// 单行写入结果
enum WriteOutcome {
    Created,
    Updated,
    Failed(FieldError),
}

pub struct CommitExecutor {
    concurrency: usize,
}

impl CommitExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// 提交预览
    ///
    /// # 参数
    /// - store: 预览暂存
    /// - repo: 持久层协作方
    /// - preview_id: 预览 ID
    /// - upsert: 是否更新与已有记录重复的行
    ///
    /// # 返回
    /// - Ok(CommitResult): 行级失败包含在 errors 中
    /// - Err(PreviewNotFound / PreviewExpired / PreviewAlreadyConsumed)
    pub async fn commit<R>(
        &self,
        store: &PreviewStore,
        repo: &R,
        preview_id: &str,
        upsert: bool,
    ) -> ImportResult<CommitResult>
    where
        R: RecordRepository + ?Sized,
    {
        let started = Instant::now();
        let staged = store.consume(preview_id)?;
        let schema = SchemaRegistry::schema_for(staged.target);
        let total_rows = staged.outcomes.len();

        // 1. 按行序生成计划
        let mut writes = Vec::new();
        let mut errors: Vec<FieldError> = Vec::new();
        let mut ignored_rows = 0;
        let mut error_rows = 0;

        for outcome in staged.outcomes {
            match outcome {
                RowOutcome::Valid(record) => writes.push(PlannedWrite::Create(record)),
                RowOutcome::Duplicate {
                    record,
                    matched_key,
                    match_source: MatchSource::Existing,
                } if upsert => writes.push(PlannedWrite::Update {
                    key: matched_key,
                    record,
                }),
                RowOutcome::Duplicate { .. } => ignored_rows += 1,
                RowOutcome::Invalid {
                    errors: row_errors, ..
                } => {
                    error_rows += 1;
                    errors.extend(row_errors);
                }
            }
        }

        // 2. 有界并发写入（结果保持计划顺序）
        let key_field = schema.key_field;
        let outcomes: Vec<WriteOutcome> = stream::iter(writes)
            .map(|write| async move {
                let row = write.row_number();
                match write {
                    PlannedWrite::Create(record) => {
                        let key = schema.key_of(&record).unwrap_or_default();
                        match repo.create_record(&record).await {
                            Ok(()) => WriteOutcome::Created,
                            Err(e) => persistence_failure(row, key_field, &key, e),
                        }
                    }
                    PlannedWrite::Update { key, record } => {
                        match repo.update_record_by_key(&key, &record).await {
                            Ok(()) => WriteOutcome::Updated,
                            Err(e) => persistence_failure(row, key_field, &key, e),
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        // 3. 汇总
        let mut successful_rows = 0;
        let mut duplicates_handled = 0;
        for outcome in outcomes {
            match outcome {
                WriteOutcome::Created => successful_rows += 1,
                WriteOutcome::Updated => duplicates_handled += 1,
                WriteOutcome::Failed(error) => {
                    warn!(
                        preview_id,
                        row = error.row,
                        key = %error.raw_value,
                        reason = %error.message,
                        "行写入失败"
                    );
                    error_rows += 1;
                    errors.push(error);
                }
            }
        }
        errors.sort_by_key(|e| e.row);

        let result = CommitResult {
            preview_id: preview_id.to_string(),
            file_name: staged.file_name,
            total_rows,
            successful_rows,
            ignored_rows,
            error_rows,
            duplicates_handled,
            upsert,
            duration_ms: started.elapsed().as_millis() as u64,
            committed_at: Utc::now(),
            errors,
        };

        info!(
            preview_id,
            file_name = %result.file_name,
            total = result.total_rows,
            successful = result.successful_rows,
            ignored = result.ignored_rows,
            errors = result.error_rows,
            duplicates_handled = result.duplicates_handled,
            elapsed_ms = result.duration_ms,
            "提交完成"
        );

        // 4. 批次审计（失败不影响结果）
        let batch = ImportBatch::from_commit(staged.target, &result);
        if let Err(e) = repo.insert_import_batch(&batch).await {
            warn!(preview_id, error = %e, "批次审计写入失败");
        }

        Ok(result)
    }
}

/// 写入失败只记在该行；非记录级故障（锁、连接）额外按 error 级别输出
fn persistence_failure(
    row: usize,
    key_field: &str,
    key: &str,
    err: RepositoryError,
) -> WriteOutcome {
    if !err.is_record_level() {
        error!(row, key, error = %err, "存储层故障");
    }
    WriteOutcome::Failed(FieldError::persistence(row, key_field, key, err.to_string()))
}
