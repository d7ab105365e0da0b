//! 上传历史 SQLite 存储
//!
//! 表结构:
//! - upload_history: 每次成功上传一行，id 自增，uploaded_at 为 Unix 毫秒

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::{HistoryError, HistoryStore, NewHistoryRecord, StoredRecord};

const SELECT_COLUMNS: &str = "id, file_name, url, file_size, upload_duration_ms, platform, original_file_name, uploaded_at";

/// 一天的毫秒数
const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// SQLite 历史存储
pub struct SqliteHistoryStore {
    /// SQLite 连接
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// 打开（或创建）历史数据库
    pub fn open(db_path: &Path) -> Result<Self, HistoryError> {
        // 确保父目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| HistoryError::Storage(format!("创建数据库目录失败: {}", e)))?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::init_tables(&conn)?;

        info!("上传历史数据库已打开: {}", db_path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（进程退出即丢失）
    pub fn open_in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 初始化数据库表
    fn init_tables(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS upload_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                url TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                upload_duration_ms INTEGER NOT NULL,
                platform TEXT,
                original_file_name TEXT,
                uploaded_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_upload_history_uploaded_at ON upload_history(uploaded_at)",
            [],
        )?;

        debug!("upload_history 表初始化完成");
        Ok(())
    }

    /// 在后台线程上执行数据库操作
    async fn with_conn<T, F>(&self, f: F) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, HistoryError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| HistoryError::Storage(format!("获取数据库锁失败: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| HistoryError::Storage(format!("数据库任务异常退出: {}", e)))?
    }

    /// 以指定写入时间追加记录
    pub async fn append_at(
        &self,
        record: NewHistoryRecord,
        uploaded_at: DateTime<Utc>,
    ) -> Result<StoredRecord, HistoryError> {
        // 存储精度为毫秒
        let uploaded_at = Utc
            .timestamp_millis_opt(uploaded_at.timestamp_millis())
            .single()
            .unwrap_or(uploaded_at);

        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO upload_history
                    (file_name, url, file_size, upload_duration_ms, platform, original_file_name, uploaded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    record.file_name,
                    record.url,
                    record.file_size as i64,
                    record.upload_duration_ms as i64,
                    record.platform.map(|p| p.as_str()),
                    record.original_file_name,
                    uploaded_at.timestamp_millis(),
                ],
            )?;

            let id = conn.last_insert_rowid();
            debug!("写入上传记录: id={}, file={}", id, record.file_name);
            Ok(StoredRecord::from_new(id, record, uploaded_at))
        })
        .await
    }

    /// 执行查询并跳过无法解析的行
    fn query_records(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredRecord>, HistoryError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!("跳过无法解析的上传记录: {}", e),
            }
        }
        Ok(records)
    }
}

/// 行转换为记录
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let platform: Option<String> = row.get(5)?;
    let uploaded_at_ms: i64 = row.get(7)?;

    let uploaded_at = Utc
        .timestamp_millis_opt(uploaded_at_ms)
        .single()
        .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(7, uploaded_at_ms))?;

    Ok(StoredRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        url: row.get(2)?,
        file_size: row.get::<_, i64>(3)?.max(0) as u64,
        upload_duration_ms: row.get::<_, i64>(4)?.max(0) as u64,
        platform: platform.and_then(|p| p.parse().ok()),
        original_file_name: row.get(6)?,
        uploaded_at,
    })
}

/// UTC 日期对应的毫秒区间 [start, end)
fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = Utc
        .from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp_millis();
    (start, start + DAY_MILLIS)
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<StoredRecord, HistoryError> {
        self.append_at(record, Utc::now()).await
    }

    async fn list_all(&self) -> Result<Vec<StoredRecord>, HistoryError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM upload_history ORDER BY uploaded_at DESC, id DESC",
                SELECT_COLUMNS
            );
            Self::query_records(conn, &sql, [])
        })
        .await
    }

    async fn remove(&self, id: i64) -> Result<(), HistoryError> {
        self.with_conn(move |conn| {
            let affected = conn.execute("DELETE FROM upload_history WHERE id = ?1", params![id])?;
            if affected == 0 {
                return Err(HistoryError::NotFound(id));
            }
            debug!("删除上传记录: id={}", id);
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM upload_history", [])?;
            info!("已清空上传历史: {} 条", affected);
            Ok(())
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Option<StoredRecord>, HistoryError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM upload_history WHERE id = ?1", SELECT_COLUMNS);
            let record = conn
                .query_row(&sql, params![id], row_to_record)
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<StoredRecord>, HistoryError> {
        let (start, end) = day_bounds(date);
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM upload_history WHERE uploaded_at >= ?1 AND uploaded_at < ?2 \
                 ORDER BY uploaded_at DESC, id DESC",
                SELECT_COLUMNS
            );
            Self::query_records(conn, &sql, params![start, end])
        })
        .await
    }

    async fn upload_dates(&self) -> Result<Vec<NaiveDate>, HistoryError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT date(uploaded_at / 1000, 'unixepoch') AS day \
                 FROM upload_history ORDER BY day DESC",
            )?;
            let days = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut dates = Vec::new();
            for day in days {
                let day = day?;
                match NaiveDate::parse_from_str(&day, "%Y-%m-%d") {
                    Ok(date) => dates.push(date),
                    Err(e) => warn!("跳过无法解析的日期 {}: {}", day, e),
                }
            }
            Ok(dates)
        })
        .await
    }
}
