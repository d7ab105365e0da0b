// 上传服务接口常量与响应解析

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

/// 分片上传接口路径
pub const UPLOAD_CHUNK_PATH: &str = "UploadChunk";

/// 合并接口路径
pub const FINALIZE_UPLOAD_PATH: &str = "FinalizeUpload";

/// multipart 字段名
pub mod fields {
    pub const FILE_NAME: &str = "FileName";
    pub const MIME_TYPE: &str = "MimeType";
    pub const CHUNK_INDEX: &str = "ChunkIndex";
    pub const TOTAL_CHUNKS: &str = "TotalChunks";
    pub const CHUNK: &str = "Chunk";
    pub const USER_ID: &str = "UserId";
}

/// 文件名编码集合，与浏览器 encodeURIComponent 保留的字符一致
const FILE_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// 编码 FileName 字段
pub fn encode_file_name(file_name: &str) -> String {
    utf8_percent_encode(file_name, FILE_NAME_ENCODE_SET).to_string()
}

/// 从合并响应中提取访问地址
///
/// 服务端可能返回 `url` 或 `Url`，键名不区分大小写
pub fn extract_url(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    if let Some(Value::String(url)) = object.get("url") {
        return Some(url.clone());
    }

    object.iter().find_map(|(key, value)| match value {
        Value::String(url) if key.eq_ignore_ascii_case("url") => Some(url.clone()),
        _ => None,
    })
}

/// 拼接接口地址
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_url_lowercase() {
        let body = json!({ "url": "https://cdn.example.com/a.mp4" });
        assert_eq!(
            extract_url(&body).as_deref(),
            Some("https://cdn.example.com/a.mp4")
        );
    }

    #[test]
    fn test_extract_url_case_insensitive() {
        let body = json!({ "Url": "https://cdn.example.com/b.mp4", "success": true });
        assert_eq!(
            extract_url(&body).as_deref(),
            Some("https://cdn.example.com/b.mp4")
        );

        let body = json!({ "URL": "https://cdn.example.com/c.mp4" });
        assert_eq!(
            extract_url(&body).as_deref(),
            Some("https://cdn.example.com/c.mp4")
        );
    }

    #[test]
    fn test_extract_url_missing() {
        assert_eq!(extract_url(&json!({ "message": "ok" })), None);
        assert_eq!(extract_url(&json!({ "url": 42 })), None);
        assert_eq!(extract_url(&json!("https://x")), None);
    }

    #[test]
    fn test_encode_file_name() {
        assert_eq!(
            encode_file_name("clip (1)!_1700000000000.mp4"),
            "clip%20(1)!_1700000000000.mp4"
        );
        assert_eq!(encode_file_name("a'b*c~d.mov"), "a'b*c~d.mov");
        assert_eq!(encode_file_name("a&b/c#d.mp4"), "a%26b%2Fc%23d.mp4");
        assert_eq!(encode_file_name("视频.mp4"), "%E8%A7%86%E9%A2%91.mp4");
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            endpoint("https://api.example.com/api/Users/", UPLOAD_CHUNK_PATH),
            "https://api.example.com/api/Users/UploadChunk"
        );
        assert_eq!(
            endpoint("http://localhost:5000", FINALIZE_UPLOAD_PATH),
            "http://localhost:5000/FinalizeUpload"
        );
    }
}
