// ==========================================
// CRM 导入管道 - 字段映射器实现
// ==========================================
// 职责: 检测到的源列 → Schema 目标字段 的建议映射 + 操作员手动调整
// 策略: 精确匹配（名称/中文标签/别名）→ 模糊匹配（子串 → Jaro-Winkler）
// 红线: 每个源列最多被一个目标字段占用
// ==========================================

use crate::domain::import::FieldMapping;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::schema::{FieldSpec, TargetSchema};
use rapidfuzz::distance::jaro_winkler;
use tracing::debug;

/// 子串匹配的最短长度（避免单字误配）
const MIN_SUBSTRING_CHARS: usize = 2;

pub struct FieldMapper {
    fuzzy_threshold: f64,
}

impl FieldMapper {
    pub fn new(fuzzy_threshold: f64) -> Self {
        Self { fuzzy_threshold }
    }

    /// 生成建议映射（按 Schema 字段顺序输出）
    ///
    /// # 参数
    /// - detected_columns: 文件表头（已去重）
    /// - schema: 目标 Schema
    ///
    /// # 返回
    /// 每个 Schema 字段一条 FieldMapping；未命中的 source_field 为空
    pub fn suggest_mappings(
        &self,
        detected_columns: &[String],
        schema: &TargetSchema,
    ) -> Vec<FieldMapping> {
        let normalized: Vec<String> = detected_columns.iter().map(|c| normalize_header(c)).collect();
        let mut used = vec![false; detected_columns.len()];
        let mut chosen: Vec<Option<usize>> = vec![None; schema.fields.len()];

        // 第一轮: 精确匹配
        for (field_idx, spec) in schema.fields.iter().enumerate() {
            let candidates = candidate_names(spec);
            let hit = normalized
                .iter()
                .enumerate()
                .find(|(col_idx, col)| !used[*col_idx] && candidates.iter().any(|c| c == *col));
            if let Some((col_idx, _)) = hit {
                used[col_idx] = true;
                chosen[field_idx] = Some(col_idx);
            }
        }

        // 第二轮: 模糊匹配（仅未映射字段）
        for (field_idx, spec) in schema.fields.iter().enumerate() {
            if chosen[field_idx].is_some() {
                continue;
            }
            if let Some(col_idx) = self.fuzzy_pick(spec, &normalized, &used) {
                debug!(
                    field = spec.name,
                    column = %detected_columns[col_idx],
                    "模糊匹配命中"
                );
                used[col_idx] = true;
                chosen[field_idx] = Some(col_idx);
            }
        }

        schema
            .fields
            .iter()
            .zip(chosen)
            .map(|(spec, col)| FieldMapping {
                target_field: spec.name.to_string(),
                source_field: col
                    .map(|idx| detected_columns[idx].clone())
                    .unwrap_or_default(),
                required: spec.required,
            })
            .collect()
    }

    fn fuzzy_pick(&self, spec: &FieldSpec, normalized: &[String], used: &[bool]) -> Option<usize> {
        let candidates = candidate_names(spec);

        // 子串包含优先
        for (col_idx, col) in normalized.iter().enumerate() {
            if used[col_idx] || col.is_empty() {
                continue;
            }
            let contains = candidates.iter().any(|cand| {
                let (short, long) = if cand.chars().count() <= col.chars().count() {
                    (cand, col)
                } else {
                    (col, cand)
                };
                short.chars().count() >= MIN_SUBSTRING_CHARS && long.contains(short.as_str())
            });
            if contains {
                return Some(col_idx);
            }
        }

        // Jaro-Winkler 相似度择优
        let mut best: Option<(usize, f64)> = None;
        for (col_idx, col) in normalized.iter().enumerate() {
            if used[col_idx] || col.is_empty() {
                continue;
            }
            let score = candidates
                .iter()
                .map(|cand| jaro_winkler::similarity(col.chars(), cand.chars()))
                .fold(0.0_f64, f64::max);
            if score >= self.fuzzy_threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((col_idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// 应用操作员手动调整
    ///
    /// # 参数
    /// - index: 映射下标
    /// - new_source_field: 新源列；空字符串表示取消映射
    ///
    /// # 规则
    /// 新源列已被其它字段占用时，原占用方被取消映射
    pub fn apply_override(
        &self,
        mappings: &mut [FieldMapping],
        index: usize,
        new_source_field: &str,
        detected_columns: &[String],
    ) -> ImportResult<()> {
        if index >= mappings.len() {
            return Err(ImportError::MappingIndexOutOfRange {
                index,
                len: mappings.len(),
            });
        }

        let new_source_field = new_source_field.trim();
        if !new_source_field.is_empty() && !detected_columns.iter().any(|c| c == new_source_field) {
            return Err(ImportError::UnknownColumn(new_source_field.to_string()));
        }

        if !new_source_field.is_empty() {
            for (idx, mapping) in mappings.iter_mut().enumerate() {
                if idx != index && mapping.source_field == new_source_field {
                    mapping.source_field.clear();
                }
            }
        }
        mappings[index].source_field = new_source_field.to_string();
        Ok(())
    }
}

/// 尚未映射的必填字段
pub fn unmapped_required(mappings: &[FieldMapping]) -> Vec<String> {
    mappings
        .iter()
        .filter(|m| m.required && !m.is_mapped())
        .map(|m| m.target_field.clone())
        .collect()
}

/// 表头规范化: 小写，去除空白/下划线/连字符
fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn candidate_names(spec: &FieldSpec) -> Vec<String> {
    std::iter::once(spec.name)
        .chain(std::iter::once(spec.label))
        .chain(spec.aliases.iter().copied())
        .map(normalize_header)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ImportTarget;
    use crate::importer::schema::SchemaRegistry;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn source_of<'a>(mappings: &'a [FieldMapping], target: &str) -> &'a str {
        mappings
            .iter()
            .find(|m| m.target_field == target)
            .map(|m| m.source_field.as_str())
            .unwrap()
    }

    #[test]
    fn test_exact_match_by_label_name_and_alias() {
        let schema = SchemaRegistry::schema_for(ImportTarget::Customers);
        let mapper = FieldMapper::new(0.85);
        let cols = columns(&["姓名", "Phone", "E-Mail", "is vip"]);

        let mappings = mapper.suggest_mappings(&cols, schema);

        assert_eq!(mappings.len(), schema.fields.len());
        assert_eq!(source_of(&mappings, "name"), "姓名");
        assert_eq!(source_of(&mappings, "phone"), "Phone");
        assert_eq!(source_of(&mappings, "email"), "E-Mail");
        assert_eq!(source_of(&mappings, "is_vip"), "is vip");
        assert_eq!(source_of(&mappings, "birthday"), "");
    }

    #[test]
    fn test_fuzzy_match_substring_and_similarity() {
        let schema = SchemaRegistry::schema_for(ImportTarget::Customers);
        let mapper = FieldMapper::new(0.85);
        let cols = columns(&["客户姓名(必填)", "Adress"]);

        let mappings = mapper.suggest_mappings(&cols, schema);

        assert_eq!(source_of(&mappings, "name"), "客户姓名(必填)");
        assert_eq!(source_of(&mappings, "address"), "Adress");
    }

    #[test]
    fn test_each_column_used_at_most_once() {
        let schema = SchemaRegistry::schema_for(ImportTarget::Customers);
        let mapper = FieldMapper::new(0.85);
        let cols = columns(&["Name"]);

        let mappings = mapper.suggest_mappings(&cols, schema);
        let used: Vec<_> = mappings.iter().filter(|m| m.is_mapped()).collect();
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].target_field, "name");
    }

    #[test]
    fn test_apply_override_rules() {
        let schema = SchemaRegistry::schema_for(ImportTarget::Customers);
        let mapper = FieldMapper::new(0.85);
        let cols = columns(&["姓名", "联系方式"]);
        let mut mappings = mapper.suggest_mappings(&cols, schema);

        assert_eq!(unmapped_required(&mappings), vec!["phone".to_string()]);

        mapper.apply_override(&mut mappings, 1, "联系方式", &cols).unwrap();
        assert!(unmapped_required(&mappings).is_empty());

        let err = mapper.apply_override(&mut mappings, 1, "不存在", &cols).unwrap_err();
        assert!(matches!(err, ImportError::UnknownColumn(_)));

        let err = mapper.apply_override(&mut mappings, 99, "", &cols).unwrap_err();
        assert!(matches!(err, ImportError::MappingIndexOutOfRange { index: 99, .. }));

        // 同一列转移到另一字段: 原占用方被取消
        mapper.apply_override(&mut mappings, 2, "联系方式", &cols).unwrap();
        assert_eq!(mappings[1].source_field, "");
        assert_eq!(mappings[2].source_field, "联系方式");

        // 空字符串 = 取消映射
        mapper.apply_override(&mut mappings, 0, "", &cols).unwrap();
        assert_eq!(
            unmapped_required(&mappings),
            vec!["name".to_string(), "phone".to_string()]
        );
    }
}
