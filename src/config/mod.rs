// 配置管理模块

use crate::uploader::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 上传历史配置
    #[serde(default)]
    pub history: HistoryConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 上传服务地址（UploadChunk / FinalizeUpload 的公共前缀）
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 分片大小 (MB)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 单批最大并发分片数
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,
    /// 提交给服务端的用户 ID
    #[serde(default = "default_user_id")]
    pub user_id: u64,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 默认目标平台
    #[serde(default)]
    pub default_platform: Option<Platform>,
}

fn default_base_url() -> String {
    "http://localhost:5000/api/Users".to_string()
}

fn default_chunk_size_mb() -> u64 {
    5
}

fn default_max_concurrent_chunks() -> usize {
    3
}

fn default_user_id() -> u64 {
    1
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chunk_size_mb: default_chunk_size_mb(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            user_id: default_user_id(),
            request_timeout_secs: default_request_timeout_secs(),
            default_platform: None,
        }
    }
}

/// 分片大小上限（MB）
pub const MAX_CHUNK_SIZE_MB: u64 = 1024;

impl UploadConfig {
    /// 分片大小（字节）
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.saturating_mul(1024 * 1024)
    }

    /// 验证上传配置
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_mb == 0 {
            anyhow::bail!("分片大小必须大于 0 MB");
        }
        if self.chunk_size_mb > MAX_CHUNK_SIZE_MB {
            anyhow::bail!(
                "分片大小不能超过 {} MB: {}",
                MAX_CHUNK_SIZE_MB,
                self.chunk_size_mb
            );
        }
        if self.max_concurrent_chunks == 0 {
            anyhow::bail!("并发分片数必须至少为 1");
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!("上传服务地址必须以 http:// 或 https:// 开头: {}", self.base_url);
        }
        Ok(())
    }
}

/// 上传历史配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// SQLite 数据库路径
    #[serde(default = "default_history_db_path")]
    pub db_path: PathBuf,
}

fn default_history_db_path() -> PathBuf {
    PathBuf::from("data/history.db")
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_history_db_path(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content).context("解析配置文件失败")?;
        config.validate().context("配置文件验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("创建配置目录失败")?;
            }
        }

        fs::write(path, content)
            .await
            .context("写入配置文件失败")?;

        tracing::info!("✓ 配置已保存: {}", path.display());
        Ok(())
    }

    /// 加载或创建默认配置
    ///
    /// 配置文件不存在时写出一份默认配置；存在但无效时使用默认值且不覆盖原文件
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if !path.exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {:#}", e);
                    }
                }

                default_config
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        self.upload.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.chunk_size_mb, 5);
        assert_eq!(config.upload.chunk_size_bytes(), 5 * 1024 * 1024);
        assert_eq!(config.upload.max_concurrent_chunks, 3);
        assert_eq!(config.upload.user_id, 1);
        assert_eq!(config.history.db_path, PathBuf::from("data/history.db"));
        assert!(config.log.enabled);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config/app.toml");

        let mut config = AppConfig::default();
        config.upload.base_url = "https://uploads.example.com/api/Users".to_string();
        config.upload.default_platform = Some(Platform::Ios);
        config.save_to_file(&path).await.unwrap();

        let loaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.upload.base_url, config.upload.base_url);
        assert_eq!(loaded.upload.default_platform, Some(Platform::Ios));
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[upload]\nchunk_size_mb = 8\n").unwrap();

        let loaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.upload.chunk_size_mb, 8);
        assert_eq!(loaded.upload.max_concurrent_chunks, 3);
        assert_eq!(loaded.log.retention_days, 7);
    }

    #[tokio::test]
    async fn test_load_or_default_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.toml");

        let config = AppConfig::load_or_default(&path).await;
        assert_eq!(config.upload.chunk_size_mb, 5);
        assert!(path.exists());
    }

    #[test]
    fn test_config_validation() {
        let mut upload = UploadConfig::default();
        assert!(upload.validate().is_ok());

        upload.chunk_size_mb = 0;
        assert!(upload.validate().is_err());

        upload.chunk_size_mb = 5;
        upload.max_concurrent_chunks = 0;
        assert!(upload.validate().is_err());

        upload.max_concurrent_chunks = 3;
        upload.base_url = "ftp://example.com".to_string();
        assert!(upload.validate().is_err());
    }

    #[test]
    fn test_oversized_chunk_size() {
        let mut upload = UploadConfig::default();

        upload.chunk_size_mb = MAX_CHUNK_SIZE_MB;
        assert!(upload.validate().is_ok());

        upload.chunk_size_mb = MAX_CHUNK_SIZE_MB + 1;
        assert!(upload.validate().is_err());

        upload.chunk_size_mb = u64::MAX;
        assert!(upload.validate().is_err());
        assert_eq!(upload.chunk_size_bytes(), u64::MAX);
    }
}
