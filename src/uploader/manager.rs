// 上传管理器
//
// 负责调用方一侧的胶水逻辑：
// - 从本地文件创建上传任务（唯一远端文件名、MIME 推断）
// - 运行上传引擎或批量协调器
// - 上传成功后写入历史；写入失败只作为警告返回，不回滚上传结果

use crate::config::UploadConfig;
use crate::history::{HistoryError, HistoryStore, NewHistoryRecord, StoredRecord};
use crate::uploader::scan::mime_for_path;
use crate::uploader::{
    BatchUploader, LocalFile, Platform, TaskCompletion, UploadEngine, UploadError, UploadTask,
    UploadTaskStatus,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 生成带时间戳的远端文件名，避免同名覆盖
///
/// `{display_name}_{unix毫秒}.{扩展名}`，扩展名取自原始文件名；没有扩展名时不加后缀
pub fn unique_remote_name(
    display_name: &str,
    original_file_name: &str,
    now: DateTime<Utc>,
) -> String {
    let millis = now.timestamp_millis();
    match Path::new(original_file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
    {
        Some(ext) => format!("{}_{}.{}", display_name, millis, ext),
        None => format!("{}_{}", display_name, millis),
    }
}

/// 单个任务的上传结果
#[derive(Debug)]
pub struct UploadOutcome {
    /// 终态任务
    pub task: UploadTask,
    /// 写入成功的历史记录
    pub record: Option<StoredRecord>,
    /// 历史写入失败（上传本身已成功）
    pub storage_warning: Option<HistoryError>,
}

impl UploadOutcome {
    pub fn succeeded(&self) -> bool {
        self.task.status == UploadTaskStatus::Succeeded
    }
}

/// 上传管理器
pub struct UploadManager {
    /// 上传引擎
    engine: Arc<UploadEngine>,
    /// 历史存储
    history: Arc<dyn HistoryStore>,
    /// 分片大小
    chunk_size: u64,
    /// 未指定平台时使用的默认平台
    default_platform: Option<Platform>,
}

impl UploadManager {
    pub fn new(engine: Arc<UploadEngine>, history: Arc<dyn HistoryStore>, chunk_size: u64) -> Self {
        Self {
            engine,
            history,
            chunk_size,
            default_platform: None,
        }
    }

    /// 从上传配置创建
    pub fn from_config(
        config: &UploadConfig,
        engine: Arc<UploadEngine>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::new(engine, history, config.chunk_size_bytes())
            .with_default_platform(config.default_platform)
    }

    pub fn with_default_platform(mut self, platform: Option<Platform>) -> Self {
        self.default_platform = platform;
        self
    }

    pub fn engine(&self) -> &UploadEngine {
        &self.engine
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// 从本地文件创建上传任务
    ///
    /// 未指定展示名称时使用文件名（不含扩展名）
    pub async fn prepare(
        &self,
        path: &Path,
        display_name: Option<&str>,
        platform: Option<Platform>,
    ) -> Result<UploadTask> {
        let source = LocalFile::open(path).await?;

        let original_file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("无效的文件名: {}", path.display()))?;

        let display_name = match display_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(original_file_name.as_str())
                .to_string(),
        };

        let remote_name = unique_remote_name(&display_name, &original_file_name, Utc::now());
        let mime_type = mime_for_path(path);

        let task = UploadTask::new(
            Arc::new(source),
            display_name,
            remote_name,
            mime_type,
            self.chunk_size,
        )?
        .with_platform(platform.or(self.default_platform))
        .with_original_file_name(original_file_name);

        info!(
            "创建上传任务: id={}, file={}, remote={}, chunks={}",
            task.id,
            path.display(),
            task.remote_name,
            task.total_chunks
        );

        Ok(task)
    }

    /// 上传单个任务，成功后写入历史
    pub async fn upload(
        &self,
        task: UploadTask,
        cancel_token: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let task = self.engine.run(task, cancel_token).await?;
        let (record, storage_warning) = persist(self.history.as_ref(), &task).await;

        Ok(UploadOutcome {
            task,
            record,
            storage_warning,
        })
    }

    /// 依次上传多个任务
    ///
    /// 返回与输入顺序一致的结果；取消后未开始的任务保持 Pending
    pub async fn upload_all(
        &self,
        tasks: Vec<UploadTask>,
        cancel_token: &CancellationToken,
    ) -> Result<Vec<UploadOutcome>, UploadError> {
        let recorder = Arc::new(PersistOnComplete {
            history: Arc::clone(&self.history),
            results: Mutex::new(HashMap::new()),
        });

        let batch = BatchUploader::new(tasks).with_on_complete(recorder.clone());
        batch.run(&self.engine, cancel_token).await?;

        let mut results = std::mem::take(&mut *recorder.results.lock());
        let outcomes = batch
            .into_tasks()
            .into_iter()
            .map(|task| {
                let (record, storage_warning) = results.remove(&task.id).unwrap_or((None, None));
                UploadOutcome {
                    task,
                    record,
                    storage_warning,
                }
            })
            .collect();

        Ok(outcomes)
    }
}

/// 写入历史记录；只处理 Succeeded 任务
async fn persist(
    history: &dyn HistoryStore,
    task: &UploadTask,
) -> (Option<StoredRecord>, Option<HistoryError>) {
    let Some(record) = NewHistoryRecord::from_task(task) else {
        return (None, None);
    };

    match history.append(record).await {
        Ok(stored) => {
            info!("上传记录已保存: id={}, file={}", stored.id, stored.file_name);
            (Some(stored), None)
        }
        Err(e) => {
            warn!("保存上传记录失败（上传已成功）: task={}, error={}", task.id, e);
            (None, Some(e))
        }
    }
}

type PersistResult = (Option<StoredRecord>, Option<HistoryError>);

/// 批量上传时逐个写入历史
struct PersistOnComplete {
    history: Arc<dyn HistoryStore>,
    results: Mutex<HashMap<String, PersistResult>>,
}

#[async_trait]
impl TaskCompletion for PersistOnComplete {
    async fn on_task_complete(&self, task: &UploadTask) {
        let result = persist(self.history.as_ref(), task).await;
        self.results.lock().insert(task.id.clone(), result);
    }
}
