// ==========================================
// CRM 导入管道 - 导入领域模型
// ==========================================
// 映射、行级错误、行分类结果、预览、提交结果、批次审计
// ==========================================

use crate::domain::record::NormalizedRecord;
use crate::domain::types::{ImportTarget, MatchSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// FieldMapping - 目标字段 ↔ 源列
// ==========================================
// 不变量: source_field 为空或属于检测到的列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub target_field: String,
    pub source_field: String, // 空字符串 = 未映射
    pub required: bool,
}

impl FieldMapping {
    pub fn is_mapped(&self) -> bool {
        !self.source_field.is_empty()
    }
}

// ==========================================
// MappingOverride - 操作员手动调整
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingOverride {
    pub index: usize,
    pub source_field: String,
}

// ==========================================
// FieldErrorKind - 行级错误原因
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldErrorKind {
    MissingRequiredField, // 必填字段缺失
    FieldCoercionError,   // 类型转换/约束校验失败
    PersistenceError,     // 提交时持久化失败
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldErrorKind::MissingRequiredField => write!(f, "MissingRequiredField"),
            FieldErrorKind::FieldCoercionError => write!(f, "FieldCoercionError"),
            FieldErrorKind::PersistenceError => write!(f, "PersistenceError"),
        }
    }
}

// ==========================================
// FieldError - 行级错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub row: usize,
    pub field: String,
    pub raw_value: String,
    pub message: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn missing_required(row: usize, field: &str) -> Self {
        Self {
            row,
            field: field.to_string(),
            raw_value: String::new(),
            message: format!("必填字段缺失: {}", field),
            kind: FieldErrorKind::MissingRequiredField,
        }
    }

    pub fn coercion(row: usize, field: &str, raw_value: &str, reason: String) -> Self {
        Self {
            row,
            field: field.to_string(),
            raw_value: raw_value.to_string(),
            message: reason,
            kind: FieldErrorKind::FieldCoercionError,
        }
    }

    pub fn persistence(row: usize, field: &str, key: &str, reason: String) -> Self {
        Self {
            row,
            field: field.to_string(),
            raw_value: key.to_string(),
            message: format!("写入失败: {}", reason),
            kind: FieldErrorKind::PersistenceError,
        }
    }
}

// ==========================================
// RowOutcome - 行分类结果
// ==========================================
// 三种分类互斥；下游组件只通过此枚举观察行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowOutcome {
    Valid(NormalizedRecord),
    Duplicate {
        record: NormalizedRecord,
        matched_key: String,
        match_source: MatchSource,
    },
    Invalid {
        row: usize,
        errors: Vec<FieldError>,
    },
}

impl RowOutcome {
    pub fn row_number(&self) -> usize {
        match self {
            RowOutcome::Valid(record) => record.row_number,
            RowOutcome::Duplicate { record, .. } => record.row_number,
            RowOutcome::Invalid { row, .. } => *row,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RowOutcome::Valid(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, RowOutcome::Duplicate { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, RowOutcome::Invalid { .. })
    }
}

// ==========================================
// ImportPreview - 预览（返回给操作员）
// ==========================================
// 不变量: total_rows = valid_rows + duplicate_rows + invalid_rows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub preview_id: String,
    pub target: ImportTarget,
    pub file_name: String,
    pub total_rows: usize,
    pub detected_columns: Vec<String>,
    pub suggested_mappings: Vec<FieldMapping>,
    pub valid_rows: usize,
    pub duplicate_rows: usize,
    pub invalid_rows: usize,
    pub errors: Vec<FieldError>,
    pub unmapped_required: Vec<String>, // 尚未映射的必填字段
    pub expires_at: DateTime<Utc>,
}

// ==========================================
// CommitResult - 提交结果
// ==========================================
// 生成后不可变，不自动重试
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub preview_id: String,
    pub file_name: String,
    pub total_rows: usize,
    pub successful_rows: usize,
    pub ignored_rows: usize,
    pub error_rows: usize,
    pub duplicates_handled: usize,
    pub upsert: bool,
    pub duration_ms: u64,
    pub committed_at: DateTime<Utc>,
    pub errors: Vec<FieldError>,
}

// ==========================================
// ImportBatch - 提交批次审计记录
// ==========================================
// 对齐: import_batch 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,             // = preview_id
    pub target: ImportTarget,
    pub file_name: String,
    pub total_rows: i64,
    pub successful_rows: i64,
    pub ignored_rows: i64,
    pub error_rows: i64,
    pub duplicates_handled: i64,
    pub upsert: bool,
    pub elapsed_ms: i64,
    pub imported_at: DateTime<Utc>,
}

impl ImportBatch {
    pub fn from_commit(target: ImportTarget, result: &CommitResult) -> Self {
        Self {
            batch_id: result.preview_id.clone(),
            target,
            file_name: result.file_name.clone(),
            total_rows: result.total_rows as i64,
            successful_rows: result.successful_rows as i64,
            ignored_rows: result.ignored_rows as i64,
            error_rows: result.error_rows as i64,
            duplicates_handled: result.duplicates_handled as i64,
            upsert: result.upsert,
            elapsed_ms: result.duration_ms as i64,
            imported_at: result.committed_at,
        }
    }
}
