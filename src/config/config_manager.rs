// ==========================================
// CRM 导入管道 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// 规则: 缺失或非法值回退默认值并告警
// ==========================================

use crate::config::import_config_trait::{ConfigReadError, ImportConfigReader};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const MAX_FILE_SIZE_BYTES: &str = "import/max_file_size_bytes";
    pub const PREVIEW_TTL_SECS: &str = "import/preview_ttl_secs";
    pub const COMMIT_CONCURRENCY: &str = "import/commit_concurrency";
    pub const FUZZY_MATCH_THRESHOLD: &str = "import/fuzzy_match_threshold";
}

// ==========================================
// 默认值
// ==========================================
pub mod defaults {
    /// 同时是上限：配置只能调低
    pub const MAX_FILE_SIZE_BYTES: usize = 20 * 1024 * 1024;
    pub const PREVIEW_TTL_SECS: u64 = 1800;
    pub const MAX_PREVIEW_TTL_SECS: u64 = 24 * 3600;
    pub const COMMIT_CONCURRENCY: usize = 8;
    pub const FUZZY_MATCH_THRESHOLD: f64 = 0.85;
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigReadError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigReadError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigReadError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// global scope 配置快照（键有序）
    pub fn get_config_snapshot(&self) -> Result<BTreeMap<String, String>, ConfigReadError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global'")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// 读取并解析配置；缺失或非法值（含 valid 校验不通过）回退默认值
    fn get_parsed_or_default<T>(
        &self,
        key: &str,
        default: T,
        valid: impl Fn(&T) -> bool,
    ) -> Result<T, ConfigReadError>
    where
        T: FromStr + Copy + std::fmt::Debug,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => Ok(value),
            _ => {
                warn!(key, value = %raw, default = ?default, "配置值非法，使用默认值");
                Ok(default)
            }
        }
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_max_file_size_bytes(&self) -> Result<usize, ConfigReadError> {
        self.get_parsed_or_default(
            config_keys::MAX_FILE_SIZE_BYTES,
            defaults::MAX_FILE_SIZE_BYTES,
            |v| (1..=defaults::MAX_FILE_SIZE_BYTES).contains(v),
        )
    }

    async fn get_preview_ttl_secs(&self) -> Result<u64, ConfigReadError> {
        self.get_parsed_or_default(
            config_keys::PREVIEW_TTL_SECS,
            defaults::PREVIEW_TTL_SECS,
            |v| (1..=defaults::MAX_PREVIEW_TTL_SECS).contains(v),
        )
    }

    async fn get_commit_concurrency(&self) -> Result<usize, ConfigReadError> {
        self.get_parsed_or_default(
            config_keys::COMMIT_CONCURRENCY,
            defaults::COMMIT_CONCURRENCY,
            |v| *v > 0,
        )
    }

    async fn get_fuzzy_match_threshold(&self) -> Result<f64, ConfigReadError> {
        self.get_parsed_or_default(
            config_keys::FUZZY_MATCH_THRESHOLD,
            defaults::FUZZY_MATCH_THRESHOLD,
            |v| (0.0..=1.0).contains(v),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_missing() {
        let manager = setup_manager();
        assert_eq!(manager.get_max_file_size_bytes().await.unwrap(), 20 * 1024 * 1024);
        assert_eq!(manager.get_preview_ttl_secs().await.unwrap(), 1800);
        assert_eq!(manager.get_commit_concurrency().await.unwrap(), 8);
        assert_eq!(manager.get_fuzzy_match_threshold().await.unwrap(), 0.85);
    }

    #[tokio::test]
    async fn test_overrides_and_invalid_values() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::PREVIEW_TTL_SECS, "60")
            .unwrap();
        manager
            .set_global_config_value(config_keys::COMMIT_CONCURRENCY, "0")
            .unwrap();
        manager
            .set_global_config_value(config_keys::FUZZY_MATCH_THRESHOLD, "abc")
            .unwrap();

        assert_eq!(manager.get_preview_ttl_secs().await.unwrap(), 60);
        assert_eq!(manager.get_commit_concurrency().await.unwrap(), 8);
        assert_eq!(manager.get_fuzzy_match_threshold().await.unwrap(), 0.85);

        let snapshot = manager.get_config_snapshot().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get(config_keys::PREVIEW_TTL_SECS).map(String::as_str), Some("60"));
    }

    #[tokio::test]
    async fn test_limits_cannot_be_raised_past_hard_caps() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::MAX_FILE_SIZE_BYTES, "1000000000")
            .unwrap();
        manager
            .set_global_config_value(config_keys::PREVIEW_TTL_SECS, "9223372036854775807")
            .unwrap();

        assert_eq!(
            manager.get_max_file_size_bytes().await.unwrap(),
            defaults::MAX_FILE_SIZE_BYTES
        );
        assert_eq!(
            manager.get_preview_ttl_secs().await.unwrap(),
            defaults::PREVIEW_TTL_SECS
        );

        // 调低仍然生效
        manager
            .set_global_config_value(config_keys::MAX_FILE_SIZE_BYTES, "1024")
            .unwrap();
        manager
            .set_global_config_value(config_keys::PREVIEW_TTL_SECS, "86400")
            .unwrap();
        assert_eq!(manager.get_max_file_size_bytes().await.unwrap(), 1024);
        assert_eq!(manager.get_preview_ttl_secs().await.unwrap(), 86400);
    }
}
