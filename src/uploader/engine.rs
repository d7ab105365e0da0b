// 上传引擎
//
// 核心功能：
// 1. 按固定分片大小切分源文件
// 2. 按批次并发上传分片（批次之间严格串行）
// 3. 全部分片成功后调用合并接口
// 4. 产出一致的终态任务（Succeeded / Failed / Cancelled）
//
// 并发策略：
// - 每批最多 max_concurrent 个分片，使用 join_all 等待整批结束（不是竞速）
// - 原子计数器追踪完成分片数和进度
// - 批内首个失败后不再启动后续批次，同批之后完成的分片不再计入进度
// - 每次运行从调用方令牌派生子令牌，取消时中止所有在途请求

use crate::uploader::chunk::{batch_ranges, split_chunks, UploadChunk};
use crate::uploader::{
    TransportError, UploadError, UploadTarget, UploadTask, UploadTaskInfo, UploadTaskStatus,
    UploadTransport, DEFAULT_MAX_CONCURRENT_CHUNKS,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 分片阶段最高进度，剩余 5% 留给合并
const CHUNK_PHASE_MAX_PROGRESS: usize = 95;

/// 根据完成分片数计算进度
fn chunk_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (completed.min(total) * CHUNK_PHASE_MAX_PROGRESS / total) as u8
}

/// 上传生命周期钩子
///
/// 用于界面层的副作用（保持唤醒、进度展示等），默认全部为空实现
pub trait UploadHooks: Send + Sync {
    /// 开始上传分片前调用
    fn on_uploading_start(&self, _task: &UploadTaskInfo) {}

    /// 每个分片完成后调用
    fn on_progress(&self, _task: &UploadTaskInfo) {}

    /// 任务进入终态后调用（只要调用过 on_uploading_start 就一定会调用）
    fn on_uploading_end(&self, _task: &UploadTaskInfo) {}
}

/// 空钩子
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl UploadHooks for NoopHooks {}

/// 分片阶段结果
enum ChunkPhase {
    Completed,
    Failed(String),
    Cancelled,
}

/// 单次运行的共享状态
struct RunState {
    completed: AtomicUsize,
    progress: AtomicU8,
    failed: AtomicBool,
    first_error: Mutex<Option<TransportError>>,
}

impl RunState {
    fn new() -> Self {
        Self {
            completed: AtomicUsize::new(0),
            progress: AtomicU8::new(0),
            failed: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    /// 记录失败，只保留第一个错误
    fn record_failure(&self, err: TransportError) {
        self.failed.store(true, Ordering::SeqCst);
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(err);
        }
    }
}

/// 上传引擎
///
/// 持有传输层、并发限制、钩子和进度通道；同一个引擎可以依次运行多个任务
pub struct UploadEngine {
    /// 传输层
    transport: Arc<dyn UploadTransport>,
    /// 单批最大并发分片数
    max_concurrent: usize,
    /// 生命周期钩子
    hooks: Arc<dyn UploadHooks>,
    /// 任务快照通道
    progress_tx: watch::Sender<Option<UploadTaskInfo>>,
}

impl UploadEngine {
    /// 创建上传引擎
    ///
    /// `max_concurrent` 为 0 时按 1 处理
    pub fn new(transport: Arc<dyn UploadTransport>, max_concurrent: usize) -> Self {
        let (progress_tx, _) = watch::channel(None);
        Self {
            transport,
            max_concurrent: max_concurrent.max(1),
            hooks: Arc::new(NoopHooks),
            progress_tx,
        }
    }

    /// 使用默认并发数创建
    pub fn with_default_concurrency(transport: Arc<dyn UploadTransport>) -> Self {
        Self::new(transport, DEFAULT_MAX_CONCURRENT_CHUNKS)
    }

    /// 设置生命周期钩子
    pub fn with_hooks(mut self, hooks: Arc<dyn UploadHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 订阅任务快照
    ///
    /// 尚未运行任何任务时值为 None
    pub fn subscribe(&self) -> watch::Receiver<Option<UploadTaskInfo>> {
        self.progress_tx.subscribe()
    }

    fn publish(&self, info: UploadTaskInfo) {
        self.progress_tx.send_replace(Some(info));
    }

    /// 运行上传任务直到终态
    ///
    /// 只接受 Pending 任务；返回的任务一定处于终态
    pub async fn run(
        &self,
        mut task: UploadTask,
        cancel_token: &CancellationToken,
    ) -> Result<UploadTask, UploadError> {
        if task.status != UploadTaskStatus::Pending {
            return Err(UploadError::InvalidState {
                task_id: task.id.clone(),
                status: task.status,
            });
        }

        let cancel = cancel_token.child_token();
        let chunks = split_chunks(task.size(), task.chunk_size);

        info!(
            "开始上传: task={}, file={}, size={}, chunks={}, concurrency={}",
            task.id,
            task.remote_name,
            task.size(),
            chunks.len(),
            self.max_concurrent
        );

        task.mark_uploading();
        let info = task.info();
        self.publish(info.clone());
        self.hooks.on_uploading_start(&info);

        match self.upload_chunks(&mut task, &chunks, &cancel).await {
            ChunkPhase::Completed => self.finalize(&mut task).await,
            ChunkPhase::Failed(reason) => {
                error!("上传失败: task={}, error={}", task.id, reason);
                task.mark_failed(reason);
            }
            ChunkPhase::Cancelled => {
                info!("上传已取消: task={}", task.id);
                task.mark_cancelled();
            }
        }

        let info = task.info();
        self.publish(info.clone());
        self.hooks.on_uploading_end(&info);

        Ok(task)
    }

    /// 分批上传所有分片
    async fn upload_chunks(
        &self,
        task: &mut UploadTask,
        chunks: &[UploadChunk],
        cancel: &CancellationToken,
    ) -> ChunkPhase {
        let total = chunks.len();
        let target = task.target();
        let base_info = task.info();
        let state = RunState::new();

        for (batch_no, batch) in batch_ranges(total, self.max_concurrent)
            .into_iter()
            .enumerate()
        {
            if cancel.is_cancelled() {
                debug!("批次#{} 启动前检测到取消信号", batch_no);
                return ChunkPhase::Cancelled;
            }

            debug!(
                "批次#{}: 分片 {}..{} / {}",
                batch_no, batch.start, batch.end, total
            );

            let current: &UploadTask = task;
            let uploads = chunks[batch].iter().map(|chunk| {
                self.upload_one(current, chunk, total, &target, &base_info, &state, cancel)
            });
            join_all(uploads).await;

            task.record_progress(
                state.completed.load(Ordering::SeqCst),
                state.progress.load(Ordering::SeqCst),
            );

            if state.failed.load(Ordering::SeqCst) {
                let first_error = state.first_error.lock().take();
                return match first_error {
                    Some(err) if !err.is_cancelled() && !cancel.is_cancelled() => {
                        ChunkPhase::Failed(err.to_string())
                    }
                    Some(_) => ChunkPhase::Cancelled,
                    None => ChunkPhase::Failed("分片上传失败".to_string()),
                };
            }
        }

        ChunkPhase::Completed
    }

    /// 上传单个分片并更新共享进度
    #[allow(clippy::too_many_arguments)]
    async fn upload_one(
        &self,
        task: &UploadTask,
        chunk: &UploadChunk,
        total: usize,
        target: &UploadTarget,
        base_info: &UploadTaskInfo,
        state: &RunState,
        cancel: &CancellationToken,
    ) {
        let result = self
            .transport
            .upload_chunk(task.source.as_ref(), chunk, total, target, cancel)
            .await;

        match result {
            Ok(_) => {
                if state.failed.load(Ordering::SeqCst) {
                    debug!("[分片#{}] 同批已有失败，忽略完成事件", chunk.index);
                    return;
                }

                let completed = state.completed.fetch_add(1, Ordering::SeqCst) + 1;
                let progress = chunk_progress(completed, total);
                let previous = state.progress.fetch_max(progress, Ordering::SeqCst);

                debug!(
                    "[分片#{}] ✓ 上传完成 ({}/{}), 进度 {}%",
                    chunk.index,
                    completed,
                    total,
                    previous.max(progress)
                );

                let mut info = base_info.clone();
                info.completed_chunks = completed;
                info.progress = previous.max(progress);
                self.publish(info.clone());
                self.hooks.on_progress(&info);
            }
            Err(e) => {
                if e.is_cancelled() {
                    debug!("[分片#{}] 已取消", chunk.index);
                } else {
                    warn!("[分片#{}] 上传失败: {}", chunk.index, e);
                }
                state.record_failure(e);
            }
        }
    }

    /// 合并分片（不可取消）
    async fn finalize(&self, task: &mut UploadTask) {
        task.mark_finalizing();
        self.publish(task.info());

        info!(
            "所有分片上传完成，开始合并: task={}, chunks={}",
            task.id, task.completed_chunks
        );

        match self.transport.finalize(task.total_chunks, &task.target()).await {
            Ok(response) => {
                info!("上传成功: task={}, url={}", task.id, response.url);
                task.mark_succeeded(response.url);
            }
            Err(e) => {
                error!("合并失败: task={}, error={}", task.id, e);
                task.mark_failed(e.to_string());
            }
        }
    }
}
