// ==========================================
// CRM 导入管道 - Row Validator（行校验器）
// ==========================================
// 职责: RawRow + 映射 → NormalizedRecord 或 FieldError 列表
// 规则: 收集全部错误，不在首个错误处短路；行间无依赖
// ==========================================

use crate::domain::import::{FieldError, FieldMapping};
use crate::domain::record::{NormalizedRecord, RawRow};
use crate::importer::schema::TargetSchema;

pub struct RowValidator;

impl RowValidator {
    /// 校验单行
    ///
    /// # 返回
    /// - Ok(NormalizedRecord): 所有必填字段存在且全部字段转换成功
    /// - Err(Vec<FieldError>): 该行的全部错误（非空）
    pub fn validate_row(
        row: &RawRow,
        mappings: &[FieldMapping],
        schema: &TargetSchema,
    ) -> Result<NormalizedRecord, Vec<FieldError>> {
        let mut record = NormalizedRecord::new(schema.target, row.row_number);
        let mut errors = Vec::new();

        for spec in schema.fields {
            let raw = mappings
                .iter()
                .find(|m| m.target_field == spec.name && m.is_mapped())
                .and_then(|m| row.get(&m.source_field))
                .map(str::trim)
                .filter(|v| !v.is_empty());

            let Some(raw) = raw else {
                if spec.required {
                    errors.push(FieldError::missing_required(row.row_number, spec.name));
                }
                continue;
            };

            match spec.kind.coerce(raw) {
                Ok(value) => record.insert(spec.name, value),
                Err(reason) => {
                    errors.push(FieldError::coercion(row.row_number, spec.name, raw, reason))
                }
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }

    /// 批量校验（输出顺序与输入行顺序一致）
    pub fn validate_rows(
        rows: &[RawRow],
        mappings: &[FieldMapping],
        schema: &TargetSchema,
    ) -> Vec<Result<NormalizedRecord, Vec<FieldError>>> {
        rows.iter()
            .map(|row| Self::validate_row(row, mappings, schema))
            .collect()
    }
}
