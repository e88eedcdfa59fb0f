// ==========================================
// CRM 导入管道 - 配置层
// ==========================================
// 职责: 导入管道配置读取（大小上限、预览有效期、并发、模糊匹配阈值）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;
pub mod import_settings;

// 重导出核心配置管理器
pub use config_manager::{config_keys, defaults, ConfigManager};
pub use import_config_trait::{ConfigReadError, ImportConfigReader};
pub use import_settings::ImportSettings;
