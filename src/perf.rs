// ==========================================
// 性能统计
// ==========================================
// - SQLite 语句计数 + 慢查询告警（rusqlite trace/profile 回调）
// - PerfGuard: 按 API 操作记录耗时与期间执行的 SQL 数
// ==========================================

use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 强制开启/关闭 SQL 统计
pub const PERF_SQL_ENV: &str = "CRM_IMPORT_PERF_SQL";
/// 慢 SQL 阈值（毫秒）
pub const SLOW_SQL_MS_ENV: &str = "CRM_IMPORT_SLOW_SQL_MS";

const SLOW_SQL_LOG_CHARS: usize = 420;

/// SQL 统计开关与阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTracingConfig {
    pub enabled: bool,
    pub slow_threshold_ms: u64,
}

impl SqlTracingConfig {
    /// 从环境变量读取
    ///
    /// - 未设置 `CRM_IMPORT_PERF_SQL` 时: Debug 开启，Release 关闭
    /// - 未设置 `CRM_IMPORT_SLOW_SQL_MS` 时: Debug 50ms，Release 200ms
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(PERF_SQL_ENV).ok().as_deref(),
            std::env::var(SLOW_SQL_MS_ENV).ok().as_deref(),
        )
    }

    fn from_values(enabled: Option<&str>, slow_ms: Option<&str>) -> Self {
        let enabled = enabled.map_or(cfg!(debug_assertions), parse_flag);
        let slow_threshold_ms = slow_ms
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
        Self {
            enabled,
            slow_threshold_ms,
        }
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

// 进程级计数：导入操作跨 await 可能切换线程
static ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);
static STATEMENTS: AtomicU64 = AtomicU64::new(0);
static SLOW_STATEMENTS: AtomicU64 = AtomicU64::new(0);

/// 计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlSnapshot {
    pub statements: u64,
    pub slow_statements: u64,
}

impl SqlSnapshot {
    pub fn now() -> Self {
        Self {
            statements: STATEMENTS.load(Ordering::Relaxed),
            slow_statements: SLOW_STATEMENTS.load(Ordering::Relaxed),
        }
    }

    fn since(self, earlier: SqlSnapshot) -> SqlSnapshot {
        SqlSnapshot {
            statements: self.statements.saturating_sub(earlier.statements),
            slow_statements: self.slow_statements.saturating_sub(earlier.slow_statements),
        }
    }
}

/// 按环境变量为连接安装 SQL 统计回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    apply_sqlite_tracing(conn, SqlTracingConfig::from_env());
}

/// 按指定配置为连接安装（或卸载）SQL 统计回调
pub fn apply_sqlite_tracing(conn: &mut Connection, config: SqlTracingConfig) {
    ENABLED.store(config.enabled, Ordering::Relaxed);
    SLOW_THRESHOLD_MS.store(config.slow_threshold_ms, Ordering::Relaxed);

    if config.enabled {
        conn.trace(Some(on_statement));
        conn.profile(Some(on_statement_done));
    } else {
        conn.trace(None);
        conn.profile(None);
    }
}

fn on_statement(_sql: &str) {
    if ENABLED.load(Ordering::Relaxed) {
        STATEMENTS.fetch_add(1, Ordering::Relaxed);
    }
}

fn on_statement_done(sql: &str, duration: Duration) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let threshold = SLOW_THRESHOLD_MS.load(Ordering::Relaxed);
    let elapsed_ms = duration.as_millis() as u64;
    if threshold == 0 || elapsed_ms < threshold {
        return;
    }

    SLOW_STATEMENTS.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        target: "slow_sql",
        duration_ms = elapsed_ms,
        sql = %shorten_sql(sql, SLOW_SQL_LOG_CHARS),
        "slow sql"
    );
}

/// 单行化并按字符截断（不切断多字节字符）
fn shorten_sql(sql: &str, max_chars: usize) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat,
    }
}

/// 操作级性能记录：drop 时输出耗时与期间 SQL 数
///
/// 并发操作时 SQL 数为该时间窗口内的进程总数
///
/// ```ignore
/// let _perf = crm_import::perf::PerfGuard::new("api.commit");
/// ```
pub struct PerfGuard {
    op: &'static str,
    started: Instant,
    baseline: SqlSnapshot,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            started: Instant::now(),
            baseline: SqlSnapshot::now(),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let delta = SqlSnapshot::now().since(self.baseline);
        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            sql_count = delta.statements,
            slow_sql_count = delta.slow_statements,
            "done"
        );
    }
}
