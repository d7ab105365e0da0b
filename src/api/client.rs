// 上传服务 HTTP 客户端
//
// UploadChunk:    FileName / MimeType / ChunkIndex / TotalChunks / Chunk / UserId
// FinalizeUpload: FileName / MimeType / TotalChunks / UserId

use crate::api::types::{
    encode_file_name, endpoint, extract_url, fields, FINALIZE_UPLOAD_PATH, UPLOAD_CHUNK_PATH,
};
use crate::config::UploadConfig;
use crate::uploader::{
    ChunkAck, FileSource, FinalizeResponse, TransportError, UploadChunk, UploadTarget,
    UploadTransport,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 上传服务客户端
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP客户端
    client: Client,
    /// 服务地址
    base_url: String,
    /// 用户 ID
    user_id: u64,
}

impl HttpTransport {
    /// 根据上传配置创建客户端
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        info!(
            "初始化上传客户端: base_url={}, timeout={}s",
            config.base_url, config.request_timeout_secs
        );

        Ok(Self::with_client(client, &config.base_url, config.user_id))
    }

    /// 使用已有的 reqwest 客户端
    pub fn with_client(client: Client, base_url: &str, user_id: u64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
        }
    }

    /// 公共表单字段
    fn base_form(&self, target: &UploadTarget, total_chunks: usize) -> multipart::Form {
        multipart::Form::new()
            .text(fields::FILE_NAME, encode_file_name(&target.file_name))
            .text(fields::MIME_TYPE, target.mime_type.clone())
            .text(fields::TOTAL_CHUNKS, total_chunks.to_string())
    }

    async fn send_chunk(
        &self,
        source: &dyn FileSource,
        chunk: &UploadChunk,
        total_chunks: usize,
        target: &UploadTarget,
    ) -> Result<ChunkAck, TransportError> {
        let data = source
            .read_range(chunk.range.clone())
            .await
            .map_err(|e| TransportError::Source(format!("{:#}", e)))?;

        let part = multipart::Part::bytes(data)
            .file_name(target.file_name.clone())
            .mime_str(&target.mime_type)
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let form = self
            .base_form(target, total_chunks)
            .text(fields::CHUNK_INDEX, chunk.index.to_string())
            .part(fields::CHUNK, part)
            .text(fields::USER_ID, self.user_id.to_string());

        let url = endpoint(&self.base_url, UPLOAD_CHUNK_PATH);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(
                "上传分片失败: file={}, part={}, status={}",
                target.file_name, chunk.index, status
            );
            return Err(TransportError::ChunkRejected {
                index: chunk.index,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.ok().filter(|b| !b.is_empty());
        debug!(
            "上传分片成功: file={}, part={}/{}, size={}",
            target.file_name,
            chunk.index,
            total_chunks,
            chunk.size()
        );

        Ok(ChunkAck {
            index: chunk.index,
            body,
        })
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn upload_chunk(
        &self,
        source: &dyn FileSource,
        chunk: &UploadChunk,
        total_chunks: usize,
        target: &UploadTarget,
        cancel_token: &CancellationToken,
    ) -> Result<ChunkAck, TransportError> {
        if cancel_token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("分片请求已中止: part={}", chunk.index);
                Err(TransportError::Cancelled)
            }
            result = self.send_chunk(source, chunk, total_chunks, target) => result,
        }
    }

    async fn finalize(
        &self,
        total_chunks: usize,
        target: &UploadTarget,
    ) -> Result<FinalizeResponse, TransportError> {
        info!(
            "合并上传分片: file={}, total_chunks={}",
            target.file_name, total_chunks
        );

        let form = self
            .base_form(target, total_chunks)
            .text(fields::USER_ID, self.user_id.to_string());

        let url = endpoint(&self.base_url, FINALIZE_UPLOAD_PATH);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!("合并文件失败: file={}, status={}", target.file_name, status);
            return Err(TransportError::FinalizeRejected {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Request(format!("解析合并响应失败: {}", e)))?;

        let url = extract_url(&body).ok_or(TransportError::MissingUrl)?;
        info!("合并文件成功: file={}, url={}", target.file_name, url);

        Ok(FinalizeResponse { url })
    }
}
