use std::sync::Arc;

use safepush_core::{Attachment, Fetcher, Oracle};
use serde_json::Value;

/// Collaborators a checker may call. Cheap to clone; fuzz workers each hold one.
#[derive(Clone)]
pub struct CheckContext {
    pub oracle: Arc<dyn Oracle>,
    pub fetcher: Arc<dyn Fetcher>,
    /// Output of the current version for the same inputs, when known.
    pub reference: Option<Value>,
}

impl CheckContext {
    pub fn new(oracle: Arc<dyn Oracle>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            oracle,
            fetcher,
            reference: None,
        }
    }

    pub fn with_reference(&self, reference: Value) -> Self {
        Self {
            reference: Some(reference),
            ..self.clone()
        }
    }

    /// Downloads every URL, in order. The first failure is returned as text.
    pub async fn fetch_all(&self, urls: &[&str]) -> Result<Vec<Attachment>, String> {
        let mut out = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetcher.fetch(url).await {
                Ok(a) => out.push(a),
                Err(e) => return Err(e.to_string()),
            }
        }
        Ok(out)
    }
}
