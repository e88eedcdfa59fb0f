// ==========================================
// CRM 导入管道 - Duplicate Resolver（重复检测）
// ==========================================
// 职责: 校验结果 → RowOutcome（Valid / Duplicate / Invalid）
// 顺序: 先文件内扫描（首次出现者胜出），再对首次出现的键批量查询持久层
// 红线: 持久层查询失败 → 整个预览失败，无部分结果
// ==========================================

use crate::domain::import::{FieldError, RowOutcome};
use crate::domain::record::NormalizedRecord;
use crate::domain::types::MatchSource;
use crate::importer::error::ImportResult;
use crate::importer::schema::TargetSchema;
use crate::repository::record_repo::RecordRepository;
use std::collections::HashSet;
use tracing::debug;

pub struct DuplicateResolver;

impl DuplicateResolver {
    /// 分类所有行（保持行序）
    ///
    /// # 参数
    /// - schema: 目标 Schema（提供自然键字段）
    /// - validated: 行校验结果（与原始行一一对应）
    /// - repo: 持久层协作方
    pub async fn resolve<R>(
        schema: &TargetSchema,
        validated: Vec<Result<NormalizedRecord, Vec<FieldError>>>,
        repo: &R,
    ) -> ImportResult<Vec<RowOutcome>>
    where
        R: RecordRepository + ?Sized,
    {
        // 第一遍: 文件内查重，登记首次出现的键
        let mut seen: HashSet<String> = HashSet::new();
        let mut first_keys: Vec<String> = Vec::new();
        let mut staged: Vec<Staged> = Vec::with_capacity(validated.len());

        for result in validated {
            match result {
                Err(errors) => {
                    let row = errors.first().map(|e| e.row).unwrap_or_default();
                    staged.push(Staged::Invalid { row, errors });
                }
                Ok(record) => match schema.key_of(&record) {
                    // 已通过必填校验，键缺失只会来自 Schema 配置错误
                    None => {
                        let row = record.row_number;
                        staged.push(Staged::Invalid {
                            row,
                            errors: vec![FieldError::missing_required(row, schema.key_field)],
                        });
                    }
                    Some(key) => {
                        if seen.insert(key.clone()) {
                            first_keys.push(key.clone());
                            staged.push(Staged::First { record, key });
                        } else {
                            staged.push(Staged::InFile { record, key });
                        }
                    }
                },
            }
        }

        // 第二遍: 单次批量查询持久层
        let existing = if first_keys.is_empty() {
            HashSet::new()
        } else {
            repo.find_existing_keys(schema.target, &first_keys).await?
        };

        debug!(
            candidates = first_keys.len(),
            existing = existing.len(),
            "重复检测完成"
        );

        Ok(staged
            .into_iter()
            .map(|s| match s {
                Staged::Invalid { row, errors } => RowOutcome::Invalid { row, errors },
                Staged::InFile { record, key } => RowOutcome::Duplicate {
                    record,
                    matched_key: key,
                    match_source: MatchSource::InFile,
                },
                Staged::First { record, key } if existing.contains(&key) => {
                    RowOutcome::Duplicate {
                        record,
                        matched_key: key,
                        match_source: MatchSource::Existing,
                    }
                }
                Staged::First { record, .. } => RowOutcome::Valid(record),
            })
            .collect())
    }
}

enum Staged {
    Invalid { row: usize, errors: Vec<FieldError> },
    First { record: NormalizedRecord, key: String },
    InFile { record: NormalizedRecord, key: String },
}
