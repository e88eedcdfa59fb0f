// ==========================================
// CRM 导入管道 - 导入配置快照
// ==========================================
// 职责: 启动时一次性读取导入配置，管道组件只持有快照
// ==========================================

use crate::config::config_manager::defaults;
use crate::config::import_config_trait::{ConfigReadError, ImportConfigReader};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub max_file_size_bytes: usize,
    pub preview_ttl_secs: u64,
    pub commit_concurrency: usize,
    pub fuzzy_match_threshold: f64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_file_size_bytes: defaults::MAX_FILE_SIZE_BYTES,
            preview_ttl_secs: defaults::PREVIEW_TTL_SECS,
            commit_concurrency: defaults::COMMIT_CONCURRENCY,
            fuzzy_match_threshold: defaults::FUZZY_MATCH_THRESHOLD,
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载快照
    pub async fn load<C>(reader: &C) -> Result<Self, ConfigReadError>
    where
        C: ImportConfigReader + ?Sized,
    {
        Ok(Self {
            max_file_size_bytes: reader.get_max_file_size_bytes().await?,
            preview_ttl_secs: reader.get_preview_ttl_secs().await?,
            commit_concurrency: reader.get_commit_concurrency().await?,
            fuzzy_match_threshold: reader.get_fuzzy_match_threshold().await?,
        })
    }

    pub fn preview_ttl(&self) -> Duration {
        Duration::from_secs(self.preview_ttl_secs)
    }
}
