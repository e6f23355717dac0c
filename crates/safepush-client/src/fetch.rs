use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use safepush_core::{file_extension, guess_media_type, url_file_name, Attachment, FetchError, Fetcher};

/// Plain HTTP(S) downloader for output and reference media.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| FetchError::Http {
            url: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Attachment, FetchError> {
        let err = |message: String| FetchError::Http {
            url: url.to_string(),
            message,
        };
        tracing::debug!(url, "fetching media");
        let resp = self.http.get(url).send().await.map_err(|e| err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(err(format!("status {status}")));
        }

        let name = url_file_name(url).to_string();
        let header_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let media_type = match header_type {
            // Storage buckets often serve everything as octet-stream.
            Some(t) if !t.is_empty() && t != "application/octet-stream" => t,
            _ => guess_media_type(&file_extension(&name)).to_string(),
        };

        let bytes = resp.bytes().await.map_err(|e| err(e.to_string()))?;
        Ok(Attachment {
            name,
            media_type,
            bytes: bytes.to_vec(),
        })
    }
}
