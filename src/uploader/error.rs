// 上传错误类型

use crate::uploader::UploadTaskStatus;
use thiserror::Error;

/// 传输层错误（分片上传 / 合并）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// 请求被取消令牌中止
    #[error("上传已取消")]
    Cancelled,
    /// 分片上传返回非成功状态
    #[error("分片 {index} 上传失败: HTTP {status}")]
    ChunkRejected { index: usize, status: u16 },
    /// 合并请求返回非成功状态
    #[error("合并文件失败: HTTP {status}")]
    FinalizeRejected { status: u16 },
    /// 合并响应中没有 url 字段
    #[error("合并响应缺少 url 字段")]
    MissingUrl,
    /// 网络请求失败（连接、超时、响应解析等）
    #[error("请求失败: {0}")]
    Request(String),
    /// 读取源文件失败
    #[error("读取源文件失败: {0}")]
    Source(String),
}

impl TransportError {
    /// 是否由取消信号导致
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// 上传编排错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 任务不处于 Pending 状态
    #[error("任务 {task_id} 状态为 {status:?}，只能启动 Pending 任务")]
    InvalidState {
        task_id: String,
        status: UploadTaskStatus,
    },
    /// 任务不存在
    #[error("任务不存在: {0}")]
    TaskNotFound(String),
    /// 分片大小无效
    #[error("分片大小必须大于 0")]
    InvalidChunkSize,
    /// 传输错误
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}
