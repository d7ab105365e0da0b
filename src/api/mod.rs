// 上传服务 HTTP 接口模块

pub mod client;
pub mod types;

pub use client::HttpTransport;
pub use types::*;
