// ==========================================
// CRM 导入管道 - Preview Store（预览暂存）
// ==========================================
// 职责: 暂存预览（行、映射、分类结果），按 ID 取回用于提交或重新映射
// 结构: 带过期时间的内存槽位表，单把锁
// 红线:
// - “检查未消费 + 标记已消费”在同一把锁内完成，同一预览最多提交一次
// - 重新映射先生成新内容，再在同一把锁内以新槽位替换旧槽位
// ==========================================

use crate::domain::import::{FieldMapping, ImportPreview, RowOutcome};
use crate::domain::record::RawRow;
use crate::domain::types::{ImportStage, ImportTarget};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::unmapped_required;
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

// ==========================================
// StagedImport - 暂存内容
// ==========================================
#[derive(Debug, Clone)]
pub struct StagedImport {
    pub target: ImportTarget,
    pub file_name: String,
    pub detected_columns: Vec<String>,
    pub rows: Vec<RawRow>,
    pub mappings: Vec<FieldMapping>,
    pub outcomes: Vec<RowOutcome>,
}

enum PreviewSlot {
    Live {
        staged: StagedImport,
        preview: ImportPreview,
        stage: ImportStage,
        expires_at: Instant,
    },
    // 已提交的墓碑，保留到 retain_until 以识别重复提交
    Consumed {
        retain_until: Instant,
    },
}

pub struct PreviewStore {
    ttl: Duration,
    slots: Mutex<HashMap<String, PreviewSlot>>,
}

impl PreviewStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 由 now 推算到期时刻（有效期过大时报配置错误）
    fn deadline(&self, now: Instant) -> ImportResult<Instant> {
        now.checked_add(self.ttl).ok_or_else(|| ttl_out_of_range(self.ttl))
    }

    fn lock(&self) -> ImportResult<std::sync::MutexGuard<HashMap<String, PreviewSlot>>> {
        self.slots
            .lock()
            .map_err(|e| ImportError::Internal(format!("预览存储锁获取失败: {}", e)))
    }

    /// 暂存并生成预览
    pub fn create(&self, staged: StagedImport) -> ImportResult<ImportPreview> {
        self.create_at(staged, Instant::now())
    }

    pub fn create_at(&self, staged: StagedImport, now: Instant) -> ImportResult<ImportPreview> {
        let preview_id = Uuid::new_v4().to_string();
        let (preview, slot) = self.live_slot(&preview_id, staged, now)?;

        let mut slots = self.lock()?;
        purge_locked(&mut slots, now);
        slots.insert(preview_id.clone(), slot);

        info!(
            preview_id = %preview_id,
            file_name = %preview.file_name,
            total = preview.total_rows,
            valid = preview.valid_rows,
            duplicate = preview.duplicate_rows,
            invalid = preview.invalid_rows,
            "预览已暂存"
        );
        Ok(preview)
    }

    fn live_slot(
        &self,
        preview_id: &str,
        staged: StagedImport,
        now: Instant,
    ) -> ImportResult<(ImportPreview, PreviewSlot)> {
        let expires_at = self.deadline(now)?;
        let preview = summarize(preview_id, &staged, self.ttl)?;
        let slot = PreviewSlot::Live {
            staged,
            preview: preview.clone(),
            stage: ImportStage::Previewed,
            expires_at,
        };
        Ok((preview, slot))
    }

    /// 读取预览摘要（不改变状态）
    pub fn get(&self, preview_id: &str) -> ImportResult<ImportPreview> {
        self.get_at(preview_id, Instant::now())
    }

    pub fn get_at(&self, preview_id: &str, now: Instant) -> ImportResult<ImportPreview> {
        let slots = self.lock()?;
        match slots.get(preview_id) {
            None => Err(ImportError::PreviewNotFound(preview_id.to_string())),
            Some(PreviewSlot::Consumed { .. }) => {
                Err(ImportError::PreviewAlreadyConsumed(preview_id.to_string()))
            }
            Some(PreviewSlot::Live { expires_at, .. }) if now >= *expires_at => {
                Err(ImportError::PreviewExpired(preview_id.to_string()))
            }
            Some(PreviewSlot::Live { preview, .. }) => Ok(preview.clone()),
        }
    }

    /// 消费预览用于提交（原子操作）
    ///
    /// # 返回
    /// - Ok(StagedImport): 暂存内容，槽位转为墓碑
    /// - Err(PreviewNotFound / PreviewExpired / PreviewAlreadyConsumed)
    /// - Err(RequiredFieldsUnmapped): 必填字段未映射，预览保持可用
    pub fn consume(&self, preview_id: &str) -> ImportResult<StagedImport> {
        self.consume_at(preview_id, Instant::now())
    }

    pub fn consume_at(&self, preview_id: &str, now: Instant) -> ImportResult<StagedImport> {
        let retain_until = self.deadline(now)?;
        let mut slots = self.lock()?;
        self.check_live(&slots, preview_id, now, ImportStage::Committed)?;

        if let Some(PreviewSlot::Live { staged, .. }) = slots.get(preview_id) {
            let missing = unmapped_required(&staged.mappings);
            if !missing.is_empty() {
                return Err(ImportError::RequiredFieldsUnmapped(missing));
            }
        }

        let tombstone = PreviewSlot::Consumed { retain_until };
        match slots.insert(preview_id.to_string(), tombstone) {
            Some(PreviewSlot::Live { staged, .. }) => {
                debug!(preview_id, "预览已消费");
                Ok(staged)
            }
            _ => Err(ImportError::Internal(format!(
                "预览槽位状态不一致: {}",
                preview_id
            ))),
        }
    }

    /// 复制暂存内容用于重新映射（原预览保持可用）
    pub fn staged_for_remap(&self, preview_id: &str) -> ImportResult<StagedImport> {
        self.staged_for_remap_at(preview_id, Instant::now())
    }

    pub fn staged_for_remap_at(&self, preview_id: &str, now: Instant) -> ImportResult<StagedImport> {
        let slots = self.lock()?;
        self.check_live(&slots, preview_id, now, ImportStage::Mapped)?;
        match slots.get(preview_id) {
            Some(PreviewSlot::Live { staged, .. }) => Ok(staged.clone()),
            _ => Err(ImportError::Internal(format!(
                "预览槽位状态不一致: {}",
                preview_id
            ))),
        }
    }

    /// 以重新映射后的内容替换原预览
    ///
    /// 原预览在同一把锁内确认仍可用后移除，新预览获得新 ID
    pub fn replace(&self, old_id: &str, staged: StagedImport) -> ImportResult<ImportPreview> {
        self.replace_at(old_id, staged, Instant::now())
    }

    pub fn replace_at(
        &self,
        old_id: &str,
        staged: StagedImport,
        now: Instant,
    ) -> ImportResult<ImportPreview> {
        let preview_id = Uuid::new_v4().to_string();
        let (preview, slot) = self.live_slot(&preview_id, staged, now)?;

        let mut slots = self.lock()?;
        self.check_live(&slots, old_id, now, ImportStage::Mapped)?;
        slots.remove(old_id);
        slots.insert(preview_id.clone(), slot);

        info!(
            old_preview_id = %old_id,
            preview_id = %preview_id,
            valid = preview.valid_rows,
            duplicate = preview.duplicate_rows,
            invalid = preview.invalid_rows,
            "预览已按新映射替换"
        );
        Ok(preview)
    }

    fn check_live(
        &self,
        slots: &HashMap<String, PreviewSlot>,
        preview_id: &str,
        now: Instant,
        next: ImportStage,
    ) -> ImportResult<()> {
        match slots.get(preview_id) {
            None => Err(ImportError::PreviewNotFound(preview_id.to_string())),
            Some(PreviewSlot::Consumed { .. }) => {
                Err(ImportError::PreviewAlreadyConsumed(preview_id.to_string()))
            }
            Some(PreviewSlot::Live { expires_at, .. }) if now >= *expires_at => {
                Err(ImportError::PreviewExpired(preview_id.to_string()))
            }
            Some(PreviewSlot::Live { stage, .. }) if !stage.can_transition_to(next) => {
                Err(ImportError::InvalidStageTransition {
                    from: stage.to_string(),
                    to: next.to_string(),
                })
            }
            Some(PreviewSlot::Live { .. }) => Ok(()),
        }
    }

    /// 清理过期槽位与过期墓碑
    ///
    /// # 返回
    /// 清理数量
    pub fn purge_expired(&self) -> ImportResult<usize> {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> ImportResult<usize> {
        let mut slots = self.lock()?;
        Ok(purge_locked(&mut slots, now))
    }

    /// 当前槽位数（含墓碑）
    pub fn len(&self) -> ImportResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> ImportResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn purge_locked(slots: &mut HashMap<String, PreviewSlot>, now: Instant) -> usize {
    let before = slots.len();
    slots.retain(|_, slot| match slot {
        PreviewSlot::Live { expires_at, .. } => now < *expires_at,
        PreviewSlot::Consumed { retain_until } => now < *retain_until,
    });
    let purged = before - slots.len();
    if purged > 0 {
        debug!(purged, "清理过期预览");
    }
    purged
}

fn ttl_out_of_range(ttl: Duration) -> ImportError {
    ImportError::Config {
        key: "import/preview_ttl_secs".to_string(),
        message: format!("预览有效期超出范围: {}s", ttl.as_secs()),
    }
}

/// 由暂存内容生成预览摘要
fn summarize(preview_id: &str, staged: &StagedImport, ttl: Duration) -> ImportResult<ImportPreview> {
    let mut valid_rows = 0;
    let mut duplicate_rows = 0;
    let mut invalid_rows = 0;
    let mut errors = Vec::new();

    for outcome in &staged.outcomes {
        match outcome {
            RowOutcome::Valid(_) => valid_rows += 1,
            RowOutcome::Duplicate { .. } => duplicate_rows += 1,
            RowOutcome::Invalid { errors: row_errors, .. } => {
                invalid_rows += 1;
                errors.extend(row_errors.iter().cloned());
            }
        }
    }

    let expires_at = i64::try_from(ttl.as_secs())
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| ttl_out_of_range(ttl))?;

    Ok(ImportPreview {
        preview_id: preview_id.to_string(),
        target: staged.target,
        file_name: staged.file_name.clone(),
        total_rows: staged.outcomes.len(),
        detected_columns: staged.detected_columns.clone(),
        suggested_mappings: staged.mappings.clone(),
        valid_rows,
        duplicate_rows,
        invalid_rows,
        errors,
        unmapped_required: unmapped_required(&staged.mappings),
        expires_at,
    })
}
