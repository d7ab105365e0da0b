//! 上传历史导出
//!
//! 生成可直接粘贴到表格软件的制表符分隔文本：
//! File Name / Platform / URL / Date / Time

use chrono::{Local, TimeZone};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::Display;

use super::StoredRecord;

/// 表头
pub const TSV_HEADER: &str = "File Name\tPlatform\tURL\tDate\tTime";

/// 与浏览器 encodeURI 一致：保留 URI 保留字符
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// 无平台时的占位
const NO_PLATFORM: &str = "N/A";

/// 按本地时区导出
pub fn to_tsv(records: &[StoredRecord]) -> String {
    to_tsv_in(records, &Local)
}

/// 按指定时区导出
pub fn to_tsv_in<Tz>(records: &[StoredRecord], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let rows = records.iter().map(|record| {
        let local = record.uploaded_at.with_timezone(tz);
        let platform = record
            .platform
            .map(|p| p.as_str())
            .unwrap_or(NO_PLATFORM);

        format!(
            "{}\t{}\t{}\t{}\t{}",
            sanitize(&record.file_name),
            platform,
            encode_uri(&record.url),
            local.format("%b %-d, %Y"),
            local.format("%I:%M %p"),
        )
    });

    std::iter::once(TSV_HEADER.to_string())
        .chain(rows)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 去掉会破坏表格结构的字符
fn sanitize(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// 对地址做 encodeURI 编码
pub fn encode_uri(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}
