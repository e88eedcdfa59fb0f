// ==========================================
// CRM 导入管道 - 行记录模型
// ==========================================
// 用途: 导入管道中间产物
// 文件解析 → RawRow → 行校验 → NormalizedRecord
// ==========================================

use crate::domain::types::ImportTarget;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// RawRow - 原始行
// ==========================================
// 保持源文件列顺序；缺失单元格不出现在 cells 中
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub row_number: usize,               // 数据行序号（1 起）
    pub cells: Vec<(String, String)>,    // (列名, 原始值)
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: Vec::new(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.push((column.into(), value.into()));
    }

    /// 按列名取原始值
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

// ==========================================
// ExtractedSheet - 文件解析结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedSheet {
    pub columns: Vec<String>, // 去重后的表头（保持顺序）
    pub rows: Vec<RawRow>,
}

// ==========================================
// FieldValue - 类型化字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

// ==========================================
// NormalizedRecord - 校验通过的规范化记录
// ==========================================
// 仅当所有必填字段可解析且全部字段校验通过时产生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub target: ImportTarget,
    pub row_number: usize,
    pub fields: BTreeMap<String, FieldValue>,
}

impl NormalizedRecord {
    pub fn new(target: ImportTarget, row_number: usize) -> Self {
        Self {
            target,
            row_number,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn get_text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldValue::as_text)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }
}
