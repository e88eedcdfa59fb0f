// ==========================================
// CRM 导入管道 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

/// 配置读取错误
pub type ConfigReadError = Box<dyn Error + Send + Sync>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 上传文件大小上限（字节）
    ///
    /// # 默认值
    /// - 20 MiB
    async fn get_max_file_size_bytes(&self) -> Result<usize, ConfigReadError>;

    /// 预览有效期（秒）
    ///
    /// # 默认值
    /// - 1800
    async fn get_preview_ttl_secs(&self) -> Result<u64, ConfigReadError>;

    /// 提交阶段的最大并发写入数
    ///
    /// # 默认值
    /// - 8
    async fn get_commit_concurrency(&self) -> Result<usize, ConfigReadError>;

    /// 表头模糊匹配阈值（Jaro-Winkler 相似度，0~1）
    ///
    /// # 默认值
    /// - 0.85
    async fn get_fuzzy_match_threshold(&self) -> Result<f64, ConfigReadError>;
}
