// ==========================================
// CRM 导入管道 - Error Reporter（错误报告导出）
// ==========================================
// 职责: FieldError 列表 → 可下载的 CSV 报告
// 格式: row,field,raw_value,message（UTF-8 BOM，Excel 可直接打开中文）
// 红线: 纯函数，不改动任何状态
// ==========================================

use crate::domain::import::FieldError;
use crate::domain::types::MEDIA_TYPE_CSV;
use crate::importer::error::{ImportError, ImportResult};
use serde::Serialize;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 错误报告文件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub file_name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

pub struct ErrorReporter;

impl ErrorReporter {
    /// 渲染 CSV 错误报告
    ///
    /// # 参数
    /// - errors: 行级错误（预览或提交结果中的 errors）
    /// - source_file_name: 原始上传文件名
    ///
    /// # 返回
    /// 文件名为 "<原名去扩展名>_errors.csv"；行按行号稳定排序
    pub fn render_csv(errors: &[FieldError], source_file_name: &str) -> ImportResult<ErrorReport> {
        let mut sorted: Vec<&FieldError> = errors.iter().collect();
        sorted.sort_by_key(|e| e.row);

        let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
        writer.write_record(["row", "field", "raw_value", "message"])?;
        for error in sorted {
            let row = error.row.to_string();
            writer.write_record([
                row.as_str(),
                error.field.as_str(),
                error.raw_value.as_str(),
                error.message.as_str(),
            ])?;
        }

        let content = writer
            .into_inner()
            .map_err(|e| ImportError::Internal(format!("错误报告写出失败: {}", e)))?;

        Ok(ErrorReport {
            file_name: report_file_name(source_file_name),
            media_type: MEDIA_TYPE_CSV.to_string(),
            content,
        })
    }
}

fn report_file_name(source_file_name: &str) -> String {
    let base = source_file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    let stem = if stem.is_empty() { "import" } else { stem };
    format!("{}_errors.csv", stem)
}
