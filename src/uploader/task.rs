// 上传任务定义
//
// 状态流转：
// Pending -> Uploading -> Finalizing -> Succeeded
//                 |            |
//                 +------------+--> Failed / Cancelled
//
// 终态（Succeeded / Failed / Cancelled）之后不再发生任何状态变化

use crate::uploader::chunk::total_chunks;
use crate::uploader::{FileSource, UploadError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// 上传任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadTaskStatus {
    /// 等待中
    Pending,
    /// 分片上传中
    Uploading,
    /// 合并中
    Finalizing,
    /// 上传成功
    Succeeded,
    /// 失败
    Failed,
    /// 已取消
    Cancelled,
}

impl UploadTaskStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadTaskStatus::Succeeded | UploadTaskStatus::Failed | UploadTaskStatus::Cancelled
        )
    }
}

/// 目标平台标签
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    Android,
    #[serde(rename = "iOS")]
    Ios,
    Web,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Android => "Android",
            Platform::Ios => "iOS",
            Platform::Web => "Web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            other => Err(format!("未知平台: {}", other)),
        }
    }
}

/// 上传目标（传输层所需的文件描述）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// 远端文件名（未编码）
    pub file_name: String,
    /// MIME 类型
    pub mime_type: String,
}

/// 上传任务
///
/// 由一次 `UploadEngine::run` 独占；进入终态后交还调用方
#[derive(Clone)]
pub struct UploadTask {
    /// 任务ID
    pub id: String,
    /// 源数据
    pub source: Arc<dyn FileSource>,
    /// 展示名称（不含扩展名）
    pub display_name: String,
    /// 远端文件名（带时间戳，避免同名冲突）
    pub remote_name: String,
    /// 本地原始文件名
    pub original_file_name: Option<String>,
    /// MIME 类型
    pub mime_type: String,
    /// 目标平台
    pub platform: Option<Platform>,
    /// 分片大小
    pub chunk_size: u64,
    /// 总分片数（创建时计算，至少为 1）
    pub total_chunks: usize,
    /// 已完成分片数
    pub completed_chunks: usize,
    /// 进度百分比 (0-100)
    pub progress: u8,
    /// 任务状态
    pub status: UploadTaskStatus,
    /// 上传成功后的访问地址
    pub result_url: Option<String>,
    /// 错误信息
    pub error: Option<String>,
    /// 创建时间 (Unix 毫秒)
    pub created_at: i64,
    /// 开始时间 (Unix 毫秒)
    pub started_at: Option<i64>,
    /// 结束时间 (Unix 毫秒)
    pub finished_at: Option<i64>,
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("id", &self.id)
            .field("remote_name", &self.remote_name)
            .field("size", &self.size())
            .field("status", &self.status)
            .field("completed_chunks", &self.completed_chunks)
            .field("total_chunks", &self.total_chunks)
            .field("progress", &self.progress)
            .finish()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl UploadTask {
    /// 创建新的上传任务
    ///
    /// `remote_name` 为实际提交给服务端的文件名
    pub fn new(
        source: Arc<dyn FileSource>,
        display_name: impl Into<String>,
        remote_name: impl Into<String>,
        mime_type: impl Into<String>,
        chunk_size: u64,
    ) -> Result<Self, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize);
        }

        let total_chunks = total_chunks(source.size(), chunk_size);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            source,
            display_name: display_name.into(),
            remote_name: remote_name.into(),
            original_file_name: None,
            mime_type: mime_type.into(),
            platform: None,
            chunk_size,
            total_chunks,
            completed_chunks: 0,
            progress: 0,
            status: UploadTaskStatus::Pending,
            result_url: None,
            error: None,
            created_at: now_millis(),
            started_at: None,
            finished_at: None,
        })
    }

    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_original_file_name(mut self, name: impl Into<String>) -> Self {
        self.original_file_name = Some(name.into());
        self
    }

    /// 源文件大小
    pub fn size(&self) -> u64 {
        self.source.size()
    }

    /// 传输层使用的目标描述
    pub fn target(&self) -> UploadTarget {
        UploadTarget {
            file_name: self.remote_name.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 上传耗时（毫秒）
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start).max(0) as u64),
            _ => None,
        }
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        if self.status != UploadTaskStatus::Pending {
            return;
        }
        self.status = UploadTaskStatus::Uploading;
        self.started_at = Some(now_millis());
    }

    /// 记录已完成分片数，进度只增不减
    pub fn record_progress(&mut self, completed_chunks: usize, progress: u8) {
        if self.is_terminal() {
            return;
        }
        self.completed_chunks = self
            .completed_chunks
            .max(completed_chunks.min(self.total_chunks));
        self.progress = self.progress.max(progress.min(100));
    }

    /// 标记为合并中
    pub fn mark_finalizing(&mut self) {
        if self.status != UploadTaskStatus::Uploading {
            return;
        }
        self.status = UploadTaskStatus::Finalizing;
    }

    /// 标记为成功
    pub fn mark_succeeded(&mut self, url: String) {
        if self.is_terminal() {
            return;
        }
        self.status = UploadTaskStatus::Succeeded;
        self.result_url = Some(url);
        self.error = None;
        self.progress = 100;
        self.finished_at = Some(now_millis());
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        if self.is_terminal() {
            return;
        }
        self.status = UploadTaskStatus::Failed;
        self.error = Some(error);
        self.finished_at = Some(now_millis());
    }

    /// 标记为已取消
    pub fn mark_cancelled(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = UploadTaskStatus::Cancelled;
        self.finished_at = Some(now_millis());
    }

    /// 基于当前任务创建新的待上传任务（新 ID，状态重置）
    ///
    /// 终态任务不可复活，重试总是产生新任务
    pub fn retry(&self) -> Self {
        let mut task = self.clone();
        task.id = Uuid::new_v4().to_string();
        task.completed_chunks = 0;
        task.progress = 0;
        task.status = UploadTaskStatus::Pending;
        task.result_url = None;
        task.error = None;
        task.created_at = now_millis();
        task.started_at = None;
        task.finished_at = None;
        task
    }

    /// 生成只读快照
    pub fn info(&self) -> UploadTaskInfo {
        UploadTaskInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            remote_name: self.remote_name.clone(),
            original_file_name: self.original_file_name.clone(),
            platform: self.platform,
            size: self.size(),
            status: self.status,
            total_chunks: self.total_chunks,
            completed_chunks: self.completed_chunks,
            progress: self.progress,
            result_url: self.result_url.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// 上传任务快照（供界面层订阅）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadTaskInfo {
    pub id: String,
    pub display_name: String,
    pub remote_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub size: u64,
    pub status: UploadTaskStatus,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}
