//! 内存上传历史

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{sort_newest_first, HistoryError, HistoryStore, NewHistoryRecord, StoredRecord};

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    records: Vec<StoredRecord>,
}

/// 内存历史存储
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<Inner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定写入时间追加记录
    pub fn append_at(&self, record: NewHistoryRecord, uploaded_at: DateTime<Utc>) -> StoredRecord {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let stored = StoredRecord::from_new(inner.last_id, record, uploaded_at);
        inner.records.push(stored.clone());
        stored
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: NewHistoryRecord) -> Result<StoredRecord, HistoryError> {
        Ok(self.append_at(record, Utc::now()))
    }

    async fn list_all(&self) -> Result<Vec<StoredRecord>, HistoryError> {
        let mut records = self.inner.lock().records.clone();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn remove(&self, id: i64) -> Result<(), HistoryError> {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        if inner.records.len() == before {
            return Err(HistoryError::NotFound(id));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        self.inner.lock().records.clear();
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<StoredRecord>, HistoryError> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
}
