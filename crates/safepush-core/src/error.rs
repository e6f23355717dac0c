use thiserror::Error;

/// Failures talking to the model hosting platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("platform returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Auth failures will not go away on retry and doom every later call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::Unauthorized(_))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Transport(_) => true,
            PlatformError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failures of the AI judging / generation service.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle api key is not set ({0})")]
    MissingApiKey(&'static str),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0}s")]
    Timeout(u64),
    #[error("could not parse oracle reply: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch {url}: {message}")]
    Http { url: String, message: String },
}

/// Malformed or contradictory configuration. Aborts the run before any remote call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
    #[error("test case {index}: at most one of {keys} may be set")]
    ConflictingCheckers { index: usize, keys: String },
    #[error("test case {index}: invalid query: {message}")]
    InvalidQuery { index: usize, message: String },
}

/// Failure of the packaging toolchain itself (not a lint finding).
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("packaging config: {0}")]
    Config(String),
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },
}
