use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use safepush_core::{
    Attachment, GenerateRequest, Inputs, JudgeRequest, Judgement, Oracle, OracleError,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ORACLE_MODEL: &str = "claude-3-7-sonnet-latest";
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(120);
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REPLY_ATTEMPTS: u32 = 3;

const JUDGE_SYSTEM: &str = "You are a strict evaluator in an automated test pipeline. \
Reply with a single JSON object of the form {\"equivalent\": true|false, \"reasoning\": \"...\"} \
and nothing else (no backticks). Keep the reasoning to one or two sentences.";

const GENERATE_SYSTEM: &str = "You always respond with valid JSON, and nothing else (no backticks, etc.). \
Your outputs will be used in a programmatic context.";

const EXAMPLE_MEDIA: &str = "Videos:
* https://storage.googleapis.com/cog-safe-push-public/harry-truman.webm
* https://storage.googleapis.com/cog-safe-push-public/mariner-launch.ogv
Images:
* https://storage.googleapis.com/cog-safe-push-public/skull.jpg
* https://storage.googleapis.com/cog-safe-push-public/fast-car.jpg
* https://storage.googleapis.com/cog-safe-push-public/rolling-stones.jpg
* https://storage.googleapis.com/cog-safe-push-public/forest.png
* https://storage.googleapis.com/cog-safe-push-public/face.gif
Music audio:
* https://storage.googleapis.com/cog-safe-push-public/folk-music.mp3
* https://storage.googleapis.com/cog-safe-push-public/ocarina.ogg
* https://storage.googleapis.com/cog-safe-push-public/nu-style-kick.wav
Test audio:
* https://storage.googleapis.com/cog-safe-push-public/clap.ogg
* https://storage.googleapis.com/cog-safe-push-public/beeps.mp3
Long speech:
* https://storage.googleapis.com/cog-safe-push-public/chekhov-article.ogg
* https://storage.googleapis.com/cog-safe-push-public/momentos-spanish.ogg
Short speech:
* https://storage.googleapis.com/cog-safe-push-public/de-experiment-german-word.ogg
* https://storage.googleapis.com/cog-safe-push-public/de-ionendosis-german-word.ogg";

/// Oracle backed by the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicOracle {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicOracle {
    pub fn new(api_key: impl Into<String>) -> Result<Self, OracleError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: DEFAULT_ANTHROPIC_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_ORACLE_MODEL.to_string(),
            timeout: DEFAULT_ORACLE_TIMEOUT,
        })
    }

    pub fn from_env() -> Result<Self, OracleError> {
        match std::env::var(ANTHROPIC_KEY_ENV) {
            Ok(key) if !key.is_empty() => Self::new(key),
            _ => Err(OracleError::MissingApiKey(ANTHROPIC_KEY_ENV)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, system: &str, content: Value) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "max_tokens": 4096,
            "temperature": 1.0,
            "system": system,
            "messages": [{ "role": "user", "content": content }],
        });
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!("{status}: {text}")));
        }
        let parsed: MessagesResponse = resp.json().await.map_err(|e| self.request_error(e))?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|b| b.text)
            .ok_or_else(|| OracleError::Malformed("reply has no text block".into()))?;
        tracing::trace!(reply = %text, "oracle reply");
        Ok(text)
    }

    fn request_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.timeout.as_secs())
        } else {
            OracleError::Unavailable(e.to_string())
        }
    }

    /// Calls the model and parses its reply, asking again when the call or the
    /// parse fails. A missing key or a timeout is not retried.
    async fn ask<T: Send>(
        &self,
        system: &str,
        content: Value,
        parse: impl Fn(&str) -> Result<T, OracleError> + Send + Sync,
    ) -> Result<T, OracleError> {
        let mut attempt = 1;
        loop {
            let result = match self.call(system, content.clone()).await {
                Ok(text) => parse(&text),
                Err(e) => Err(e),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e @ (OracleError::MissingApiKey(_) | OracleError::Timeout(_))) => return Err(e),
                Err(e) if attempt < REPLY_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "oracle call failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn judge(&self, request: JudgeRequest) -> Result<Judgement, OracleError> {
        tracing::debug!(attachments = request.attachments.len(), "oracle judge");
        tracing::trace!(instruction = %request.instruction, "judge prompt");
        let content = message_content(&request.instruction, &request.attachments);
        self.ask(JUDGE_SYSTEM, content, parse_judgement).await
    }

    async fn generate_inputs(&self, request: GenerateRequest) -> Result<Inputs, OracleError> {
        let prompt = generate_prompt(&request);
        tracing::debug!(history = request.history.len(), "oracle generate inputs");
        tracing::trace!(%prompt, "generate prompt");
        self.ask(GENERATE_SYSTEM, Value::String(prompt), parse_inputs).await
    }
}

/// Images go in as base64 image blocks; other media are described in text
/// since the Messages API only accepts images.
pub fn message_content(instruction: &str, attachments: &[Attachment]) -> Value {
    if attachments.is_empty() {
        return Value::String(instruction.to_string());
    }
    let mut blocks = Vec::with_capacity(attachments.len() + 1);
    let mut metadata = String::new();
    for (i, a) in attachments.iter().enumerate() {
        metadata.push_str(&format!(
            "\n* file {}: {} ({}, {} bytes)",
            i + 1,
            a.name,
            a.media_type,
            a.bytes.len()
        ));
        if a.media_type.starts_with("image/") {
            blocks.push(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": a.media_type,
                    "data": STANDARD.encode(&a.bytes),
                }
            }));
        }
    }
    let text = format!("{instruction}\n\nMetadata for the attached file(s):{metadata}");
    blocks.push(json!({ "type": "text", "text": text }));
    Value::Array(blocks)
}

/// Strips a Markdown code fence if the model added one anyway.
fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_judgement(reply: &str) -> Result<Judgement, OracleError> {
    let cleaned = strip_fence(reply);
    match cleaned {
        "YES" => {
            return Ok(Judgement {
                equivalent: true,
                reasoning: String::new(),
            })
        }
        "NO" => {
            return Ok(Judgement {
                equivalent: false,
                reasoning: String::new(),
            })
        }
        _ => {}
    }
    serde_json::from_str(cleaned).map_err(|e| OracleError::Malformed(format!("{e}: {reply}")))
}

pub fn parse_inputs(reply: &str) -> Result<Inputs, OracleError> {
    match serde_json::from_str::<Value>(strip_fence(reply)) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(OracleError::Malformed(format!("expected a JSON object, got {other}"))),
        Err(e) => Err(OracleError::Malformed(format!("{e}: {reply}"))),
    }
}

pub fn generate_prompt(request: &GenerateRequest) -> String {
    let schema = serde_json::to_string_pretty(&request.schema).unwrap_or_default();
    let mut prompt = format!(
        "Below is the input schema of a machine learning model. Each input has a name, a type \
         (with choices, minimum and maximum where constrained), an optional default and a description.\n\n\
         {schema}\n\n\
         Generate a JSON object with a valid value for the inputs described above, keyed by input name.\n\n\
         If inputs have format=uri, you should use one of the following media URLs (pick an appropriate URL \
         for the input, e.g. one of the image examples below if the input expects an image):\n\
         {EXAMPLE_MEDIA}\n\n\
         If the schema has default values for some of the inputs, feel free to either use the defaults \
         or come up with new values.\n"
    );

    let fixed: Inputs = request
        .fixed_inputs
        .iter()
        .filter(|(k, _)| !request.disabled_inputs.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !fixed.is_empty() {
        prompt.push_str(&format!(
            "The following key/values must be present in the payload if they exist in the schema: {}\n",
            serde_json::to_string(&fixed).unwrap_or_default()
        ));
    }
    if !request.disabled_inputs.is_empty() {
        prompt.push_str(&format!(
            "The following keys must not be present in the payload: {}\n",
            serde_json::to_string(&request.disabled_inputs).unwrap_or_default()
        ));
    }

    let required: Vec<&str> = request.schema.required_inputs().map(|p| p.name.as_str()).collect();
    if request.only_required {
        prompt.push_str(&format!("Only include the following required keys: {}", required.join(", ")));
    } else {
        prompt.push_str(&format!(
            "Include the following required keys (and preferably some optional keys too): {}",
            required.join(", ")
        ));
    }

    if let Some(guidance) = &request.guidance {
        prompt.push_str(&format!("\n\nAdditional guidance for choosing values: {guidance}"));
    }

    if !request.history.is_empty() {
        let history: Vec<String> = request
            .history
            .iter()
            .map(|i| format!("* {}", serde_json::to_string(i).unwrap_or_default()))
            .collect();
        prompt.push_str(&format!(
            "\n\nReturn a new combination of inputs that you haven't used before, ideally that's quite \
             diverse from inputs you've used before. You have previously used these inputs:\n{}",
            history.join("\n")
        ));
    }
    prompt
}
