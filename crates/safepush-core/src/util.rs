use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::model::Inputs;

/// Returns current unix epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Cuts `s` to `max_chars` characters, appending `...` when shortened.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Compact, truncated rendering of a JSON value for messages.
pub fn preview(v: &serde_json::Value, max_chars: usize) -> String {
    let s = match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate(&s, max_chars)
}

/// Stable sha256 of an input set. `Inputs` is a BTreeMap so key order is fixed.
pub fn inputs_fingerprint(inputs: &Inputs) -> String {
    let canonical = serde_json::Value::Object(inputs.clone().into_iter().collect()).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Last path segment of a URL, without query or fragment.
pub fn url_file_name(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme.split(['?', '#']).next().unwrap_or_default();
    match path.split_once('/') {
        Some((_, p)) => p.rsplit('/').next().unwrap_or_default(),
        None => "",
    }
}

/// Lowercased extension of a file name, without the dot. Empty when absent.
pub fn file_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Media type from a file extension; `application/octet-stream` when unknown.
pub fn guess_media_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello...");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn preview_unquotes_strings() {
        assert_eq!(preview(&json!("abc"), 10), "abc");
        assert_eq!(preview(&json!({"a": 1}), 100), r#"{"a":1}"#);
    }

    #[test]
    fn media_types() {
        assert_eq!(file_extension("out.JPG"), "jpg");
        assert_eq!(file_extension(".bashrc"), "");
        assert_eq!(url_file_name("https://x.io/a/out.png?sig=1#f"), "out.png");
        assert_eq!(url_file_name("https://x.io"), "");
        assert_eq!(guess_media_type("JPG"), "image/jpeg");
        assert_eq!(guess_media_type("xyz"), "application/octet-stream");
    }

    #[test]
    fn fingerprint_is_stable() {
        let mut a = Inputs::new();
        a.insert("b".into(), json!(2));
        a.insert("a".into(), json!(1));
        let mut b = Inputs::new();
        b.insert("a".into(), json!(1));
        b.insert("b".into(), json!(2));
        assert_eq!(inputs_fingerprint(&a), inputs_fingerprint(&b));
        assert_eq!(inputs_fingerprint(&a).len(), 64);
    }
}
