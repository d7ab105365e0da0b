// 上传分片规划
//
// 分片规则：
// - 按固定分片大小切分，最后一个分片可以更短
// - 空文件也产生一个长度为 0 的分片，保证 finalize 至少对应一个分片索引
// - 分片按批次调度，每批最多 max_concurrent 个分片并发上传

use std::ops::Range;

/// 默认上传分片大小: 5MB
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// 默认单批并发分片数
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 3;

/// 上传分片描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    /// 分片索引（从 0 开始）
    pub index: usize,
    /// 字节范围 [start, end)
    pub range: Range<u64>,
}

impl UploadChunk {
    pub fn new(index: usize, range: Range<u64>) -> Self {
        Self { index, range }
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// 计算总分片数
///
/// 至少为 1（空文件也需要一个分片）
pub fn total_chunks(file_size: u64, chunk_size: u64) -> usize {
    if chunk_size == 0 {
        return 1;
    }
    file_size.div_ceil(chunk_size).max(1) as usize
}

/// 切分分片
///
/// # 参数
/// * `file_size` - 文件总大小
/// * `chunk_size` - 分片大小（必须大于 0）
///
/// # 返回
/// 按索引递增排列、无空隙无重叠地覆盖 [0, file_size) 的分片列表
pub fn split_chunks(file_size: u64, chunk_size: u64) -> Vec<UploadChunk> {
    if file_size == 0 || chunk_size == 0 {
        return vec![UploadChunk::new(0, 0..file_size)];
    }

    let mut chunks = Vec::with_capacity(total_chunks(file_size, chunk_size));
    let mut offset = 0u64;
    let mut index = 0;

    while offset < file_size {
        let end = std::cmp::min(offset.saturating_add(chunk_size), file_size);
        chunks.push(UploadChunk::new(index, offset..end));
        offset = end;
        index += 1;
    }

    chunks
}

/// 按并发数划分批次
///
/// 第 k 批包含索引 [k*max_concurrent, min((k+1)*max_concurrent, total_chunks))
pub fn batch_ranges(total_chunks: usize, max_concurrent: usize) -> Vec<Range<usize>> {
    let step = max_concurrent.max(1);
    (0..total_chunks)
        .step_by(step)
        .map(|start| start..std::cmp::min(start + step, total_chunks))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_chunk_creation() {
        let chunk = UploadChunk::new(0, 0..1024);
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.range.start, 0);
        assert_eq!(chunk.range.end, 1024);
        assert_eq!(chunk.size(), 1024);
    }

    #[test]
    fn test_chunk_calculation() {
        // 12MB 文件，5MB 分片 -> 3 个分片，最后一个 2MB
        let chunks = split_chunks(12 * MB, 5 * MB);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].range, 0..(5 * MB));
        assert_eq!(chunks[1].range, (5 * MB)..(10 * MB));
        assert_eq!(chunks[2].range, (10 * MB)..(12 * MB));
        assert_eq!(chunks[2].size(), 2 * MB);

        // 恰好整除
        let chunks = split_chunks(10 * MB, 5 * MB);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].range, (5 * MB)..(10 * MB));
    }

    #[test]
    fn test_empty_file_single_chunk() {
        let chunks = split_chunks(0, DEFAULT_UPLOAD_CHUNK_SIZE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].size(), 0);
        assert_eq!(total_chunks(0, DEFAULT_UPLOAD_CHUNK_SIZE), 1);
    }

    #[test]
    fn test_small_file_single_chunk() {
        let chunks = split_chunks(100, DEFAULT_UPLOAD_CHUNK_SIZE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].range, 0..100);
    }

    #[test]
    fn test_batch_ranges() {
        assert_eq!(batch_ranges(3, 3), vec![0..3]);
        assert_eq!(batch_ranges(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(batch_ranges(1, 3), vec![0..1]);
        // 并发数为 0 时按 1 处理
        assert_eq!(batch_ranges(2, 0), vec![0..1, 1..2]);
    }

    proptest! {
        #[test]
        fn prop_chunks_tile_file(file_size in 0u64..50_000_000, chunk_size in 1024u64..8_000_000) {
            let chunks = split_chunks(file_size, chunk_size);

            let expected = std::cmp::max(1, file_size.div_ceil(chunk_size)) as usize;
            prop_assert_eq!(chunks.len(), expected);
            prop_assert_eq!(total_chunks(file_size, chunk_size), expected);

            let mut cursor = 0u64;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.range.start, cursor);
                prop_assert!(chunk.size() <= chunk_size);
                cursor = chunk.range.end;
            }
            prop_assert_eq!(cursor, file_size);
        }

        #[test]
        fn prop_batches_cover_indices(total in 1usize..500, limit in 1usize..16) {
            let batches = batch_ranges(total, limit);
            let flat: Vec<usize> = batches.iter().cloned().flatten().collect();
            prop_assert_eq!(flat, (0..total).collect::<Vec<_>>());
            prop_assert!(batches.iter().all(|b| b.len() <= limit));
        }
    }
}
