// 测试用传输层与钩子

use crate::uploader::{
    ChunkAck, FileSource, FinalizeResponse, TransportError, UploadChunk, UploadHooks, UploadTarget,
    UploadTaskInfo, UploadTaskStatus, UploadTransport,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 可编排的模拟传输层
///
/// 记录调用次数、在途并发峰值、启动顺序；支持指定分片失败、延迟和触发取消
pub(crate) struct MockTransport {
    url: String,
    delay: Duration,
    chunk_delays: HashMap<usize, Duration>,
    failing_chunks: HashMap<usize, u16>,
    finalize_error: Option<TransportError>,
    cancel_trigger: Option<(usize, CancellationToken)>,

    upload_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
    successes: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    bytes_received: AtomicU64,
    started: Mutex<Vec<usize>>,
    finalized_files: Mutex<Vec<String>>,
    successes_at_finalize: Mutex<Option<usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            url: "https://cdn.example.com/video.mp4".to_string(),
            delay: Duration::ZERO,
            chunk_delays: HashMap::new(),
            failing_chunks: HashMap::new(),
            finalize_error: None,
            cancel_trigger: None,
            upload_calls: AtomicUsize::new(0),
            finalize_calls: AtomicUsize::new(0),
            successes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            bytes_received: AtomicU64::new(0),
            started: Mutex::new(Vec::new()),
            finalized_files: Mutex::new(Vec::new()),
            successes_at_finalize: Mutex::new(None),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 单独指定某个分片的延迟，覆盖统一延迟
    pub fn delay_chunk(mut self, index: usize, delay: Duration) -> Self {
        self.chunk_delays.insert(index, delay);
        self
    }

    pub fn fail_chunk(mut self, index: usize, status: u16) -> Self {
        self.failing_chunks.insert(index, status);
        self
    }

    pub fn fail_finalize(mut self, err: TransportError) -> Self {
        self.finalize_error = Some(err);
        self
    }

    /// 指定分片开始上传时触发取消
    pub fn cancel_when_chunk_starts(mut self, index: usize, token: CancellationToken) -> Self {
        self.cancel_trigger = Some((index, token));
        self
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::SeqCst)
    }

    pub fn started_indices(&self) -> Vec<usize> {
        self.started.lock().clone()
    }

    pub fn finalized_files(&self) -> Vec<String> {
        self.finalized_files.lock().clone()
    }

    /// 合并时已成功的分片数
    pub fn successes_at_finalize(&self) -> Option<usize> {
        *self.successes_at_finalize.lock()
    }
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn upload_chunk(
        &self,
        source: &dyn FileSource,
        chunk: &UploadChunk,
        _total_chunks: usize,
        _target: &UploadTarget,
        cancel_token: &CancellationToken,
    ) -> Result<ChunkAck, TransportError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push(chunk.index);

        if let Some((index, token)) = &self.cancel_trigger {
            if *index == chunk.index {
                token.cancel();
            }
        }

        if cancel_token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let outcome = async {
            let delay = self
                .chunk_delays
                .get(&chunk.index)
                .copied()
                .unwrap_or(self.delay);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel_token.cancelled() => return Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if let Some(status) = self.failing_chunks.get(&chunk.index) {
                return Err(TransportError::ChunkRejected {
                    index: chunk.index,
                    status: *status,
                });
            }

            let data = match source.read_range(chunk.range.clone()).await {
                Ok(data) => data,
                Err(e) => return Err(TransportError::Source(e.to_string())),
            };
            self.bytes_received
                .fetch_add(data.len() as u64, Ordering::SeqCst);

            Ok(ChunkAck {
                index: chunk.index,
                body: None,
            })
        }
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if outcome.is_ok() {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        outcome
    }

    async fn finalize(
        &self,
        _total_chunks: usize,
        target: &UploadTarget,
    ) -> Result<FinalizeResponse, TransportError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        *self.successes_at_finalize.lock() = Some(self.successes.load(Ordering::SeqCst));
        self.finalized_files.lock().push(target.file_name.clone());

        match &self.finalize_error {
            Some(err) => Err(err.clone()),
            None => Ok(FinalizeResponse {
                url: self.url.clone(),
            }),
        }
    }
}

/// 记录钩子调用的测试钩子
#[derive(Default)]
pub(crate) struct RecordingHooks {
    starts: AtomicUsize,
    ends: AtomicUsize,
    progress: Mutex<Vec<u8>>,
    last_end: Mutex<Option<UploadTaskStatus>>,
}

impl RecordingHooks {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.progress.lock().clone()
    }

    pub fn last_end_status(&self) -> Option<UploadTaskStatus> {
        *self.last_end.lock()
    }
}

impl UploadHooks for RecordingHooks {
    fn on_uploading_start(&self, _task: &UploadTaskInfo) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_progress(&self, task: &UploadTaskInfo) {
        self.progress.lock().push(task.progress);
    }

    fn on_uploading_end(&self, task: &UploadTaskInfo) {
        self.ends.fetch_add(1, Ordering::SeqCst);
        *self.last_end.lock() = Some(task.status);
    }
}
