use safepush_core::{file_extension, url_file_name};
use serde_json::Value;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Lowercased extension of the URL's path, without the dot. Empty when absent.
pub fn url_extension(url: &str) -> String {
    file_extension(url_file_name(url))
}

pub fn extensions_match(a: &str, b: &str) -> bool {
    url_extension(a) == url_extension(b)
}

pub fn is_image(url: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&url_extension(url).as_str())
}

/// The single URL an output stands for: a URL string or a one-element list of one.
pub fn output_url(output: &Value) -> Option<&str> {
    match output {
        Value::String(s) if is_url(s) => Some(s.as_str()),
        Value::Array(items) if items.len() == 1 => items[0].as_str().filter(|s| is_url(s)),
        _ => None,
    }
}

/// Every URL an output is made of, when it is entirely URLs (a string, list or
/// object of them). Empty otherwise.
pub fn output_urls(output: &Value) -> Vec<&str> {
    match output {
        Value::String(s) if is_url(s) => vec![s.as_str()],
        Value::Array(items) => all_urls(items.iter()),
        Value::Object(map) => all_urls(map.values()),
        _ => vec![],
    }
}

fn all_urls<'a>(items: impl ExactSizeIterator<Item = &'a Value>) -> Vec<&'a str> {
    let total = items.len();
    let urls: Vec<&str> = items.filter_map(Value::as_str).filter(|s| is_url(s)).collect();
    if total > 0 && urls.len() == total {
        urls
    } else {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extension_ignores_query_and_case() {
        assert_eq!(url_extension("https://x.io/a/out.PNG?sig=1"), "png");
        assert_eq!(url_extension("https://x.io/a/out"), "");
        assert_eq!(url_extension("https://x.io"), "");
        assert_eq!(url_extension("https://x.io/.hidden"), "");
        assert!(extensions_match("https://a/x.webp", "http://b/y.WEBP#f"));
        assert!(!extensions_match("https://a/x.png", "https://a/x.jpg"));
    }

    #[test]
    fn single_output_url() {
        assert_eq!(output_url(&json!("https://a/x.png")), Some("https://a/x.png"));
        assert_eq!(output_url(&json!(["https://a/x.png"])), Some("https://a/x.png"));
        assert_eq!(output_url(&json!(["https://a/x.png", "https://a/y.png"])), None);
        assert_eq!(output_url(&json!("hello")), None);
    }

    #[test]
    fn output_urls_requires_all_urls() {
        assert_eq!(output_urls(&json!({"a": "https://a/x.png", "b": "https://a/y.png"})).len(), 2);
        assert!(output_urls(&json!(["https://a/x.png", 3])).is_empty());
        assert!(output_urls(&json!([])).is_empty());
    }

    #[test]
    fn image_urls() {
        assert!(is_image("https://a/b.gif"));
        assert!(!is_image("https://a/b.mp3"));
    }
}
