// 批量上传协调器
//
// 多个文件依次（串行）上传，每个文件内部仍按批次并发上传分片。
// 同一个取消令牌会中止当前文件并阻止后续文件开始，未开始的任务保持 Pending。

use crate::uploader::{UploadEngine, UploadError, UploadTask, UploadTaskInfo, UploadTaskStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 单个任务进入终态后的回调
#[async_trait]
pub trait TaskCompletion: Send + Sync {
    async fn on_task_complete(&self, task: &UploadTask);
}

/// 各状态任务数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub pending: usize,
    /// 上传中（含合并中）
    pub uploading: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchCounts {
    pub fn total(&self) -> usize {
        self.pending + self.uploading + self.succeeded + self.failed + self.cancelled
    }
}

/// 批量上传协调器
///
/// 任务列表放在读写锁内，上传过程中可以从其他任务读取计数和快照
pub struct BatchUploader {
    tasks: RwLock<Vec<UploadTask>>,
    on_complete: Option<Arc<dyn TaskCompletion>>,
}

impl BatchUploader {
    pub fn new(tasks: Vec<UploadTask>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
            on_complete: None,
        }
    }

    /// 设置任务完成回调
    pub fn with_on_complete(mut self, callback: Arc<dyn TaskCompletion>) -> Self {
        self.on_complete = Some(callback);
        self
    }

    /// 追加任务
    pub fn push(&self, task: UploadTask) {
        self.tasks.write().push(task);
    }

    /// 移除尚未开始的任务
    ///
    /// 只有 Pending 任务可以移除，上传中或已结束的任务返回 InvalidState
    pub fn remove(&self, task_id: &str) -> Result<UploadTask, UploadError> {
        let mut tasks = self.tasks.write();
        let position = tasks
            .iter()
            .position(|task| task.id == task_id)
            .ok_or_else(|| UploadError::TaskNotFound(task_id.to_string()))?;

        let status = tasks[position].status;
        if status != UploadTaskStatus::Pending {
            return Err(UploadError::InvalidState {
                task_id: task_id.to_string(),
                status,
            });
        }

        info!("移除等待中的任务: {}", tasks[position].remote_name);
        Ok(tasks.remove(position))
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// 所有任务快照
    pub fn snapshot(&self) -> Vec<UploadTaskInfo> {
        self.tasks.read().iter().map(UploadTask::info).collect()
    }

    /// 取出所有任务
    pub fn into_tasks(self) -> Vec<UploadTask> {
        self.tasks.into_inner()
    }

    /// 统计各状态任务数
    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for task in self.tasks.read().iter() {
            match task.status {
                UploadTaskStatus::Pending => counts.pending += 1,
                UploadTaskStatus::Uploading | UploadTaskStatus::Finalizing => {
                    counts.uploading += 1
                }
                UploadTaskStatus::Succeeded => counts.succeeded += 1,
                UploadTaskStatus::Failed => counts.failed += 1,
                UploadTaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// 失败和已取消的任务替换为新的 Pending 任务
    ///
    /// 返回重新排队的任务数
    pub fn requeue_failed(&self) -> usize {
        let mut tasks = self.tasks.write();
        let mut requeued = 0;
        for task in tasks.iter_mut() {
            if matches!(
                task.status,
                UploadTaskStatus::Failed | UploadTaskStatus::Cancelled
            ) {
                *task = task.retry();
                requeued += 1;
            }
        }
        requeued
    }

    /// 依次上传所有 Pending 任务
    ///
    /// 已处于终态的任务跳过；取消后剩余任务保持 Pending
    pub async fn run(
        &self,
        engine: &UploadEngine,
        cancel_token: &CancellationToken,
    ) -> Result<BatchCounts, UploadError> {
        info!("批量上传开始: {} 个任务", self.len());

        // 按 id 定位任务，运行期间列表可能被移除或追加
        let mut started = 0;
        loop {
            if cancel_token.is_cancelled() {
                info!("批量上传已取消，剩余任务保持等待");
                break;
            }

            let pending = {
                let mut tasks = self.tasks.write();
                let Some(task) = tasks
                    .iter_mut()
                    .find(|task| task.status == UploadTaskStatus::Pending)
                else {
                    break;
                };
                let pending = task.clone();
                // 列表中的副本只用于计数展示
                task.mark_uploading();
                pending
            };

            started += 1;
            info!(
                "批量上传 [{}/{}]: {}",
                started,
                self.len(),
                pending.remote_name
            );

            let task_id = pending.id.clone();
            let finished = engine.run(pending, cancel_token).await?;

            if let Some(callback) = &self.on_complete {
                callback.on_task_complete(&finished).await;
            }

            if let Some(slot) = self
                .tasks
                .write()
                .iter_mut()
                .find(|task| task.id == task_id)
            {
                *slot = finished;
            }
        }

        let counts = self.counts();
        info!(
            "批量上传结束: 成功 {}, 失败 {}, 取消 {}, 等待 {}",
            counts.succeeded, counts.failed, counts.cancelled, counts.pending
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::testing::MockTransport;
    use crate::uploader::MemoryFile;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn make_task(name: &str, size: usize) -> UploadTask {
        UploadTask::new(
            Arc::new(MemoryFile::zeroed(size)),
            name,
            format!("{}_1700000000000.mp4", name),
            "video/mp4",
            4,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Collect {
        finished: Mutex<Vec<(String, UploadTaskStatus)>>,
    }

    #[async_trait]
    impl TaskCompletion for Collect {
        async fn on_task_complete(&self, task: &UploadTask) {
            self.finished
                .lock()
                .push((task.display_name.clone(), task.status));
        }
    }

    #[tokio::test]
    async fn test_runs_tasks_sequentially() {
        let transport = Arc::new(MockTransport::new());
        let engine = UploadEngine::new(transport.clone(), 3);
        let collect = Arc::new(Collect::default());

        let batch = BatchUploader::new(vec![
            make_task("a", 10),
            make_task("b", 0),
            make_task("c", 4),
        ])
        .with_on_complete(collect.clone());

        let counts = batch
            .run(&engine, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(counts.succeeded, 3);
        assert_eq!(counts.total(), 3);
        assert_eq!(
            transport.finalized_files(),
            vec![
                "a_1700000000000.mp4",
                "b_1700000000000.mp4",
                "c_1700000000000.mp4"
            ]
        );
        let finished = collect.finished.lock().clone();
        assert_eq!(finished.len(), 3);
        assert_eq!(finished[0].0, "a");
        assert!(finished
            .iter()
            .all(|(_, s)| *s == UploadTaskStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_cancel_leaves_later_tasks_pending() {
        let token = CancellationToken::new();
        // 第一个任务的第二个分片开始时取消
        let transport = Arc::new(
            MockTransport::new()
                .with_delay(Duration::from_millis(10))
                .cancel_when_chunk_starts(1, token.clone()),
        );
        let engine = UploadEngine::new(transport.clone(), 1);

        let batch = BatchUploader::new(vec![make_task("a", 12), make_task("b", 12)]);
        let counts = batch.run(&engine, &token).await.unwrap();

        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(transport.finalize_calls(), 0);

        let tasks = batch.into_tasks();
        assert_eq!(tasks[0].status, UploadTaskStatus::Cancelled);
        assert_eq!(tasks[1].status, UploadTaskStatus::Pending);
        assert!(tasks[1].started_at.is_none());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        // 只有第一个任务有 index 2 的分片
        let transport = Arc::new(MockTransport::new().fail_chunk(2, 500));
        let engine = UploadEngine::new(transport, 3);

        let batch = BatchUploader::new(vec![make_task("a", 12), make_task("b", 4)]);
        let counts = batch
            .run(&engine, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(counts.failed, 1);
        assert_eq!(counts.succeeded, 1);
    }

    #[tokio::test]
    async fn test_requeue_failed_then_rerun() {
        let failing = Arc::new(MockTransport::new().fail_chunk(0, 500));
        let batch = BatchUploader::new(vec![make_task("a", 4), make_task("b", 4)]);

        let counts = batch
            .run(&UploadEngine::new(failing, 3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(counts.failed, 2);
        let failed_ids: Vec<String> = batch.snapshot().into_iter().map(|t| t.id).collect();

        assert_eq!(batch.requeue_failed(), 2);
        assert_eq!(batch.counts().pending, 2);
        let requeued_ids: Vec<String> = batch.snapshot().into_iter().map(|t| t.id).collect();
        assert_ne!(failed_ids, requeued_ids);

        let healthy = Arc::new(MockTransport::new());
        let counts = batch
            .run(
                &UploadEngine::new(healthy.clone(), 3),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(healthy.finalize_calls(), 2);
    }

    #[tokio::test]
    async fn test_terminal_tasks_are_skipped() {
        let transport = Arc::new(MockTransport::new());
        let engine = UploadEngine::new(transport.clone(), 3);

        let mut done = make_task("done", 4);
        done.mark_uploading();
        done.mark_finalizing();
        done.mark_succeeded("https://cdn.example.com/done.mp4".to_string());

        let batch = BatchUploader::new(vec![done, make_task("next", 4)]);
        let counts = batch
            .run(&engine, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(counts.succeeded, 2);
        assert_eq!(transport.finalize_calls(), 1);
    }

    #[tokio::test]
    async fn test_remove_pending_task() {
        let transport = Arc::new(MockTransport::new());
        let engine = UploadEngine::new(transport.clone(), 3);

        let keep = make_task("keep", 4);
        let queued = make_task("queued", 4);
        let queued_id = queued.id.clone();
        let batch = BatchUploader::new(vec![keep, queued]);

        let removed = batch.remove(&queued_id).unwrap();
        assert_eq!(removed.display_name, "queued");
        assert_eq!(batch.len(), 1);
        assert!(matches!(
            batch.remove(&queued_id),
            Err(UploadError::TaskNotFound(_))
        ));

        let counts = batch
            .run(&engine, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(transport.finalized_files(), vec!["keep_1700000000000.mp4"]);
    }

    #[tokio::test]
    async fn test_remove_rejects_finished_task() {
        let engine = UploadEngine::new(Arc::new(MockTransport::new()), 3);
        let task = make_task("a", 4);
        let id = task.id.clone();
        let batch = BatchUploader::new(vec![task]);

        batch
            .run(&engine, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            batch.remove(&id),
            Err(UploadError::InvalidState {
                status: UploadTaskStatus::Succeeded,
                ..
            })
        ));
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_queued_task_while_running() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(30)));
        let engine = UploadEngine::new(transport.clone(), 3);

        let first = make_task("first", 4);
        let first_id = first.id.clone();
        let second = make_task("second", 4);
        let second_id = second.id.clone();
        let third = make_task("third", 4);
        let batch = BatchUploader::new(vec![first, second, third]);

        let cancel = CancellationToken::new();
        let (counts, removal) = tokio::join!(batch.run(&engine, &cancel), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let running = batch.remove(&first_id);
            let queued = batch.remove(&second_id);
            (running, queued)
        });

        let (running, queued) = removal;
        assert!(matches!(
            running,
            Err(UploadError::InvalidState {
                status: UploadTaskStatus::Uploading,
                ..
            })
        ));
        assert!(queued.is_ok());

        let counts = counts.unwrap();
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.total(), 2);
        assert_eq!(
            transport.finalized_files(),
            vec!["first_1700000000000.mp4", "third_1700000000000.mp4"]
        );

        let names: Vec<String> = batch
            .snapshot()
            .into_iter()
            .map(|info| info.remote_name)
            .collect();
        assert_eq!(
            names,
            vec!["first_1700000000000.mp4", "third_1700000000000.mp4"]
        );
    }
}
