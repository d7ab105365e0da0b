// Video Upload Rust Library
// 分片视频上传客户端核心库

// 上传服务 HTTP 接口
pub mod api;

// 配置管理模块
pub mod config;

// 上传历史模块
pub mod history;

// 日志系统
pub mod logging;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use api::HttpTransport;
pub use config::AppConfig;
pub use history::{
    HistoryError, HistoryStore, MemoryHistoryStore, NewHistoryRecord, SqliteHistoryStore,
    StoredRecord,
};
pub use uploader::{
    BatchUploader, Platform, TransportError, UploadEngine, UploadError, UploadHooks,
    UploadManager, UploadOutcome, UploadTask, UploadTaskInfo, UploadTaskStatus, UploadTransport,
};
