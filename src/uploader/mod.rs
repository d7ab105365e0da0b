// 上传模块
//
// - chunk:     分片规划（纯函数）
// - source:    源文件读取
// - transport: 传输层抽象
// - engine:    分片上传编排（核心状态机）
// - batch:     多文件串行上传
// - manager:   任务创建与历史写入
// - scan:      视频文件扫描

pub mod batch;
pub mod chunk;
pub mod engine;
pub mod error;
pub mod manager;
pub mod scan;
pub mod source;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchCounts, BatchUploader, TaskCompletion};
pub use chunk::{
    batch_ranges, split_chunks, total_chunks, UploadChunk, DEFAULT_MAX_CONCURRENT_CHUNKS,
    DEFAULT_UPLOAD_CHUNK_SIZE,
};
pub use engine::{NoopHooks, UploadEngine, UploadHooks};
pub use error::{TransportError, UploadError};
pub use manager::{unique_remote_name, UploadManager, UploadOutcome};
pub use scan::{mime_for_path, ScanOptions, ScannedVideo, VideoScanner};
pub use source::{FileSource, LocalFile, MemoryFile};
pub use task::{Platform, UploadTarget, UploadTask, UploadTaskInfo, UploadTaskStatus};
pub use transport::{ChunkAck, FinalizeResponse, UploadTransport};
