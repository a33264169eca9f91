//! Error types for the impulse-purchase decision service.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ImpulseError>;

/// Typed failures surfaced by the LLM Gateway (component D).
///
/// These are never retried except `RateLimited`, which the Gateway's own
/// retry loop handles without consuming an attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmErrorKind {
    #[error("xAI/Vertex service disabled for this project")]
    ServiceDisabled,
    #[error("credential lacks required scope")]
    InsufficientScope,
    #[error("permission denied")]
    PermissionDenied,
    #[error("rate limited")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed JSON response: {0}")]
    MalformedJson(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("{0}")]
    Generic(String),
}

/// Main error type for impulse-guard operations.
#[derive(Error, Debug)]
pub enum ImpulseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("memory file missing: {0}")]
    MemoryFileMissing(PathBuf),

    #[error("write verification mismatch for {0}")]
    WriteVerifyMismatch(PathBuf),

    #[error("invalid or missing LLM credentials: {0}")]
    CredentialsInvalid(String),

    #[error("LLM gateway error: {0}")]
    Llm(#[from] LlmErrorKind),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<ImpulseError>,
    },

    #[error("{0}")]
    Other(String),
}

impl ImpulseError {
    pub fn context(self, context: impl Into<String>) -> Self {
        ImpulseError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ImpulseError::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ImpulseError::Validation(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        ImpulseError::Other(msg.into())
    }

    /// Whether this error should surface as an HTTP validation failure
    /// rather than a degraded 2xx verdict: only malformed input should ever
    /// produce a non-2xx response.
    pub fn is_validation(&self) -> bool {
        matches!(self, ImpulseError::Validation(_))
    }
}

/// Extension trait for adding context to `Result`s.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ImpulseError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}
