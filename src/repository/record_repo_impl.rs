// ==========================================
// CRM 导入管道 - 记录持久化 Repository 实现
// ==========================================
// 职责: 使用 rusqlite 实现 RecordRepository
// 红线: Repository 不含业务规则，只做数据 CRUD
// 约束: 所有值使用参数化，列名仅来自静态白名单
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import::ImportBatch;
use crate::domain::record::{FieldValue, NormalizedRecord};
use crate::domain::types::ImportTarget;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_repo::RecordRepository;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// IN (...) 查询单批最大参数个数（SQLite 默认上限 999）
const KEY_LOOKUP_CHUNK: usize = 500;

const CUSTOMER_COLUMNS: &[&str] = &[
    "phone", "name", "email", "gender", "birthday", "address", "tags", "is_vip", "notes",
];
const ORDER_COLUMNS: &[&str] = &[
    "order_number",
    "customer_phone",
    "order_date",
    "total_amount",
    "quantity",
    "status",
    "payment_method",
    "notes",
];

/// 目标表元信息
struct TableInfo {
    table: &'static str,
    key_column: &'static str,
    columns: &'static [&'static str],
}

fn table_info(target: ImportTarget) -> TableInfo {
    match target {
        ImportTarget::Customers => TableInfo {
            table: "customers",
            key_column: "phone",
            columns: CUSTOMER_COLUMNS,
        },
        ImportTarget::Orders => TableInfo {
            table: "orders",
            key_column: "order_number",
            columns: ORDER_COLUMNS,
        },
    }
}

/// FieldValue → SQLite 值（日期存 YYYY-MM-DD，标签存 JSON 数组）
fn to_sql_value(column: &str, value: &FieldValue) -> RepositoryResult<Value> {
    Ok(match value {
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(n) => Value::Integer(*n),
        FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
        FieldValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        FieldValue::List(items) => {
            let json = serde_json::to_string(items).map_err(|e| {
                RepositoryError::FieldValueError {
                    field: column.to_string(),
                    message: e.to_string(),
                }
            })?;
            Value::Text(json)
        }
    })
}

/// 提取记录中属于白名单的列（保持白名单顺序）
fn record_columns(
    info: &TableInfo,
    record: &NormalizedRecord,
) -> RepositoryResult<Vec<(&'static str, Value)>> {
    let mut out = Vec::new();
    for column in info.columns {
        if let Some(value) = record.get(column) {
            out.push((*column, to_sql_value(column, value)?));
        }
    }
    Ok(out)
}

// ==========================================
// SqliteRecordRepository
// ==========================================
pub struct SqliteRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 使用共享连接创建实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn customer_exists(conn: &Connection, phone: &str) -> RepositoryResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM customers WHERE phone = ?1 LIMIT 1",
                [phone],
                |_row| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }
}

#[async_trait]
impl RecordRepository for SqliteRecordRepository {
    async fn exists_by_key(&self, target: ImportTarget, key: &str) -> RepositoryResult<bool> {
        let info = table_info(target);
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
            info.table, info.key_column
        );
        let found = conn.query_row(&sql, [key], |_row| Ok(true)).optional()?;
        Ok(found.unwrap_or(false))
    }

    async fn find_existing_keys(
        &self,
        target: ImportTarget,
        keys: &[String],
    ) -> RepositoryResult<HashSet<String>> {
        let info = table_info(target);
        let conn = self.get_conn()?;
        let mut existing = HashSet::new();

        for chunk in keys.chunks(KEY_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {key} FROM {table} WHERE {key} IN ({placeholders})",
                key = info.key_column,
                table = info.table,
                placeholders = placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for key in rows {
                existing.insert(key?);
            }
        }

        debug!(
            import_target = %target,
            queried = keys.len(),
            existing = existing.len(),
            "批量查询自然键"
        );
        Ok(existing)
    }

    async fn create_record(&self, record: &NormalizedRecord) -> RepositoryResult<()> {
        let info = table_info(record.target);
        let columns = record_columns(&info, record)?;
        let conn = self.get_conn()?;

        // 订单必须关联到已存在的客户
        if record.target == ImportTarget::Orders {
            let phone = record.get_text("customer_phone").unwrap_or_default();
            if !Self::customer_exists(&conn, phone)? {
                return Err(RepositoryError::ForeignKeyViolation(format!(
                    "客户不存在: {}",
                    phone
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        let mut names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let mut values: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
        names.push("created_at");
        names.push("updated_at");
        values.push(Value::Text(now.clone()));
        values.push(Value::Text(now));

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            info.table,
            names.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    async fn update_record_by_key(
        &self,
        key: &str,
        record: &NormalizedRecord,
    ) -> RepositoryResult<()> {
        let info = table_info(record.target);
        let columns: Vec<(&str, Value)> = record_columns(&info, record)?
            .into_iter()
            .filter(|(name, _)| *name != info.key_column)
            .collect();
        let conn = self.get_conn()?;

        if record.target == ImportTarget::Orders {
            if let Some(phone) = record.get_text("customer_phone") {
                if !Self::customer_exists(&conn, phone)? {
                    return Err(RepositoryError::ForeignKeyViolation(format!(
                        "客户不存在: {}",
                        phone
                    )));
                }
            }
        }

        let mut assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", name, i + 1))
            .collect();
        let mut values: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();

        values.push(Value::Text(Utc::now().to_rfc3339()));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(Value::Text(key.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            info.table,
            assignments.join(", "),
            info.key_column,
            values.len()
        );
        let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: info.table.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_import_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, target, file_name, total_rows, successful_rows,
                ignored_rows, error_rows, duplicates_handled, upsert,
                elapsed_ms, imported_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                batch.batch_id,
                batch.target.to_string(),
                batch.file_name,
                batch.total_rows,
                batch.successful_rows,
                batch.ignored_rows,
                batch.error_rows,
                batch.duplicates_handled,
                batch.upsert,
                batch.elapsed_ms,
                batch.imported_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn count_records(&self, target: ImportTarget) -> RepositoryResult<usize> {
        let info = table_info(target);
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", info.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
