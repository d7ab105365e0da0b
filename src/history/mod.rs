//! 上传历史模块
//!
//! 上传成功后由调用方写入一条不可变记录：
//! - `HistoryStore`: 存储端口（追加 / 列表 / 删除 / 清空）
//! - `SqliteHistoryStore`: SQLite 持久化实现
//! - `MemoryHistoryStore`: 内存实现（测试和临时会话）
//! - `export`: 导出为制表符分隔文本

pub mod export;
pub mod memory;
pub mod sqlite;

pub use export::to_tsv;
pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

use crate::uploader::{Platform, UploadTask, UploadTaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 历史存储错误
#[derive(Debug, Error)]
pub enum HistoryError {
    /// 记录不存在
    #[error("上传记录不存在: {0}")]
    NotFound(i64),
    /// 存储层错误（数据库、锁、后台任务）
    #[error("历史存储错误: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        HistoryError::Storage(e.to_string())
    }
}

/// 待写入的历史记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    /// 远端文件名
    pub file_name: String,
    /// 访问地址
    pub url: String,
    /// 文件大小（字节）
    pub file_size: u64,
    /// 上传耗时（毫秒）
    pub upload_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
}

impl NewHistoryRecord {
    /// 从成功的上传任务构建记录，非 Succeeded 任务返回 None
    pub fn from_task(task: &UploadTask) -> Option<Self> {
        if task.status != UploadTaskStatus::Succeeded {
            return None;
        }

        Some(Self {
            file_name: task.remote_name.clone(),
            url: task.result_url.clone()?,
            file_size: task.size(),
            upload_duration_ms: task.duration_ms().unwrap_or(0),
            platform: task.platform,
            original_file_name: task.original_file_name.clone(),
        })
    }
}

/// 已存储的历史记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// 存储端分配的自增 ID
    pub id: i64,
    pub file_name: String,
    pub url: String,
    pub file_size: u64,
    pub upload_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    /// 写入时间
    pub uploaded_at: DateTime<Utc>,
}

impl StoredRecord {
    pub(crate) fn from_new(id: i64, record: NewHistoryRecord, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            file_name: record.file_name,
            url: record.url,
            file_size: record.file_size,
            upload_duration_ms: record.upload_duration_ms,
            platform: record.platform,
            original_file_name: record.original_file_name,
            uploaded_at,
        }
    }

    /// 上传日期（UTC）
    pub fn upload_date(&self) -> NaiveDate {
        self.uploaded_at.date_naive()
    }
}

/// 上传历史存储端口
///
/// 上传引擎从不直接访问存储，由调用方在任务成功后写入
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 追加记录，返回带 ID 和写入时间的记录
    async fn append(&self, record: NewHistoryRecord) -> Result<StoredRecord, HistoryError>;

    /// 按上传时间倒序列出所有记录（同一时间按 ID 倒序）
    async fn list_all(&self) -> Result<Vec<StoredRecord>, HistoryError>;

    /// 删除记录
    async fn remove(&self, id: i64) -> Result<(), HistoryError>;

    /// 清空所有记录
    async fn clear(&self) -> Result<(), HistoryError>;

    /// 按 ID 查询
    async fn get(&self, id: i64) -> Result<Option<StoredRecord>, HistoryError>;

    /// 列出指定日期（UTC）上传的记录
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<StoredRecord>, HistoryError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.upload_date() == date)
            .collect())
    }

    /// 有上传记录的日期，新的在前
    async fn upload_dates(&self) -> Result<Vec<NaiveDate>, HistoryError> {
        let mut dates: Vec<NaiveDate> = self
            .list_all()
            .await?
            .iter()
            .map(StoredRecord::upload_date)
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();
        Ok(dates)
    }
}

/// 按上传时间倒序、ID 倒序排序
pub(crate) fn sort_newest_first(records: &mut [StoredRecord]) {
    records.sort_by(|a, b| {
        b.uploaded_at
            .cmp(&a.uploaded_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
