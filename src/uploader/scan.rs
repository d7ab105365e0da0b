//! 视频文件扫描
//!
//! 负责:
//! - 展开命令行给出的文件和文件夹（文件夹递归扫描）
//! - 只保留视频文件
//! - 根据扩展名推断 MIME 类型

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 未知类型的 MIME
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// 支持的视频扩展名及其 MIME 类型
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("3gp", "video/3gpp"),
    ("3g2", "video/3gpp2"),
    ("ogv", "video/ogg"),
    ("ts", "video/mp2t"),
];

/// 根据扩展名查找视频 MIME 类型
fn video_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
}

/// 根据路径推断 MIME 类型
pub fn mime_for_path(path: &Path) -> &'static str {
    video_mime(path).unwrap_or(FALLBACK_MIME_TYPE)
}

/// 是否为视频文件
pub fn is_video_file(path: &Path) -> bool {
    video_mime(path).is_some()
}

/// 扫描到的视频文件
#[derive(Debug, Clone)]
pub struct ScannedVideo {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 相对于扫描根目录的路径（直接给出的文件为文件名）
    pub relative_path: PathBuf,
    /// 文件大小（字节）
    pub size: u64,
    /// MIME 类型
    pub mime_type: &'static str,
}

/// 扫描配置
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
    /// 最大文件大小（字节），超过此大小的文件将被跳过
    pub max_file_size: Option<u64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            skip_hidden: true,
            max_file_size: None,
        }
    }
}

/// 视频文件扫描器
#[derive(Debug, Clone, Default)]
pub struct VideoScanner {
    options: ScanOptions,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

impl VideoScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 展开路径列表为视频文件列表
    ///
    /// 按输入顺序处理；文件夹内的文件按相对路径排序。
    /// 直接给出的非视频文件会被跳过并记录警告
    pub fn scan<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<ScannedVideo>> {
        let mut videos = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("扫描路径不存在: {}", path.display()))?;

            if metadata.is_dir() {
                videos.extend(self.scan_dir(path)?);
            } else if metadata.is_file() {
                match self.accept(path, metadata.len()) {
                    Some(mime_type) => videos.push(ScannedVideo {
                        local_path: path.to_path_buf(),
                        relative_path: path.file_name().map(PathBuf::from).unwrap_or_default(),
                        size: metadata.len(),
                        mime_type,
                    }),
                    None => warn!("跳过非视频文件: {}", path.display()),
                }
            } else {
                warn!("跳过非常规文件: {}", path.display());
            }
        }

        info!(
            "扫描完成: {} 个视频文件，总大小 {}",
            videos.len(),
            format_bytes(videos.iter().map(|v| v.size).sum())
        );

        Ok(videos)
    }

    /// 递归扫描文件夹
    fn scan_dir(&self, root: &Path) -> Result<Vec<ScannedVideo>> {
        info!("开始扫描文件夹: {}", root.display());

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root)
            .follow_links(self.options.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !(skip_hidden && is_hidden(entry)));

        let mut videos = Vec::new();
        for entry in walker {
            let entry = entry.with_context(|| format!("读取目录失败: {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let size = entry
                .metadata()
                .with_context(|| format!("读取文件元数据失败: {}", path.display()))?
                .len();

            let Some(mime_type) = self.accept(path, size) else {
                continue;
            };

            let relative_path = path
                .strip_prefix(root)
                .with_context(|| {
                    format!(
                        "计算相对路径失败: {} (root: {})",
                        path.display(),
                        root.display()
                    )
                })?
                .to_path_buf();

            debug!(
                "扫描到视频: {} ({})",
                relative_path.display(),
                format_bytes(size)
            );

            videos.push(ScannedVideo {
                local_path: path.to_path_buf(),
                relative_path,
                size,
                mime_type,
            });
        }

        videos.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(videos)
    }

    /// 判断文件是否应当上传，返回其 MIME 类型
    fn accept(&self, path: &Path, size: u64) -> Option<&'static str> {
        let mime_type = video_mime(path)?;

        if let Some(max_size) = self.options.max_file_size {
            if size > max_size {
                warn!("跳过超大文件: {} ({})", path.display(), format_bytes(size));
                return None;
            }
        }

        Some(mime_type)
    }
}

/// 格式化字节大小
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
