// 传输层抽象
//
// 编排器只依赖两个操作：上传单个分片、合并分片。
// 传输层本身不做重试，失败立即返回给编排器。

use crate::uploader::{FileSource, TransportError, UploadChunk, UploadTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// 分片上传确认
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAck {
    /// 分片索引
    pub index: usize,
    /// 服务端返回的原始响应（可能为空）
    #[serde(default)]
    pub body: Option<String>,
}

/// 合并响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeResponse {
    /// 合并后文件的访问地址
    pub url: String,
}

/// 上传传输层
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// 上传单个分片
    ///
    /// 取消令牌触发时必须中止请求并返回 `TransportError::Cancelled`
    async fn upload_chunk(
        &self,
        source: &dyn FileSource,
        chunk: &UploadChunk,
        total_chunks: usize,
        target: &UploadTarget,
        cancel_token: &CancellationToken,
    ) -> Result<ChunkAck, TransportError>;

    /// 合并所有分片，返回访问地址
    async fn finalize(
        &self,
        total_chunks: usize,
        target: &UploadTarget,
    ) -> Result<FinalizeResponse, TransportError>;
}
