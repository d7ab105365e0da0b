// 上传源文件抽象
//
// 分片上传只需要两种能力：报告总大小、按字节范围读取。
// 并发分片读取的是互不重叠的范围，每次读取独立打开文件句柄。

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 上传源（只读）
#[async_trait]
pub trait FileSource: Send + Sync {
    /// 文件总大小（字节）
    fn size(&self) -> u64;

    /// 读取字节范围 [start, end)
    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>>;
}

/// 本地文件
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    size: u64,
}

impl LocalFile {
    /// 打开本地文件，记录打开时的大小
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("读取文件元数据失败: {}", path.display()))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {}", path.display());
        }

        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for LocalFile {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        if range.end > self.size || range.start > range.end {
            anyhow::bail!(
                "读取范围越界: {}..{} (文件大小 {})",
                range.start,
                range.end,
                self.size
            );
        }

        let path = self.path.clone();
        let start = range.start;
        let len = (range.end - range.start) as usize;

        let buffer = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut file =
                std::fs::File::open(&path).with_context(|| format!("无法打开文件: {:?}", path))?;
            file.seek(SeekFrom::Start(start))?;

            let mut buffer = vec![0u8; len];
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
        .await
        .context("读取分片任务异常")??;

        debug!(
            "读取分片数据: {:?}, bytes={}..{}, 大小={}",
            self.path,
            range.start,
            range.end,
            buffer.len()
        );

        Ok(buffer)
    }
}

/// 内存数据源
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// 指定大小的零填充数据
    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        let start = range.start as usize;
        let end = range.end as usize;
        self.data
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or_else(|| anyhow::anyhow!("读取范围越界: {}..{}", start, end))
    }
}
