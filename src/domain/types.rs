// ==========================================
// CRM 导入管道 - 领域类型定义
// ==========================================
// 职责: 导入目标、文件格式、生命周期阶段、重复来源
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入目标 (Import Target)
// ==========================================
// 决定使用哪一份 Schema Registry 条目
// 序列化格式: SCREAMING_SNAKE_CASE (与前端契约一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportTarget {
    Customers, // 客户
    Orders,    // 订单
}

impl ImportTarget {
    /// 从命令行/请求参数解析（大小写不敏感）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "customers" | "customer" => Some(ImportTarget::Customers),
            "orders" | "order" => Some(ImportTarget::Orders),
            _ => None,
        }
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportTarget::Customers => write!(f, "CUSTOMERS"),
            ImportTarget::Orders => write!(f, "ORDERS"),
        }
    }
}

// ==========================================
// 源文件格式 (Source Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xls,
    Xlsx,
}

pub const MEDIA_TYPE_CSV: &str = "text/csv";
pub const MEDIA_TYPE_XLS: &str = "application/vnd.ms-excel";
pub const MEDIA_TYPE_XLSX: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

impl SourceFormat {
    /// 按媒体类型识别（忽略 `; charset=...` 参数）
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        match essence.as_str() {
            MEDIA_TYPE_CSV => Some(SourceFormat::Csv),
            MEDIA_TYPE_XLS => Some(SourceFormat::Xls),
            MEDIA_TYPE_XLSX => Some(SourceFormat::Xlsx),
            _ => None,
        }
    }

    /// 按文件扩展名识别
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "xls" => Some(SourceFormat::Xls),
            "xlsx" => Some(SourceFormat::Xlsx),
            _ => None,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            SourceFormat::Csv => MEDIA_TYPE_CSV,
            SourceFormat::Xls => MEDIA_TYPE_XLS,
            SourceFormat::Xlsx => MEDIA_TYPE_XLSX,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Csv => write!(f, "csv"),
            SourceFormat::Xls => write!(f, "xls"),
            SourceFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

// ==========================================
// 导入生命周期阶段 (Import Stage)
// ==========================================
// Uploaded → Mapped → Previewed → Committed
// 允许从 Mapped/Previewed 回到 Mapped（重新映射）
// Committed 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStage {
    Uploaded,
    Mapped,
    Previewed,
    Committed,
}

impl ImportStage {
    pub fn can_transition_to(&self, next: ImportStage) -> bool {
        use ImportStage::{Committed, Mapped, Previewed, Uploaded};
        matches!(
            (self, next),
            (Uploaded, Mapped)
                | (Mapped, Mapped)
                | (Mapped, Previewed)
                | (Previewed, Mapped)
                | (Previewed, Committed)
        )
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStage::Uploaded => write!(f, "UPLOADED"),
            ImportStage::Mapped => write!(f, "MAPPED"),
            ImportStage::Previewed => write!(f, "PREVIEWED"),
            ImportStage::Committed => write!(f, "COMMITTED"),
        }
    }
}

// ==========================================
// 重复来源 (Match Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSource {
    Existing, // 与已持久化记录重复
    InFile,   // 与同文件中较早的行重复
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::Existing => write!(f, "EXISTING"),
            MatchSource::InFile => write!(f, "IN_FILE"),
        }
    }
}
