// Error types for the analysis pipeline
//
// Per-item errors (provider, parse) are always rendered into the item's
// `error` field. Only validation and pipeline errors reach HTTP status.

use std::time::Duration;
use thiserror::Error;

/// Submission shape errors, raised before any provider call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no files provided")]
    NoFiles,

    #[error("too many files: {count} submitted, maximum is {max}")]
    TooManyFiles { count: usize, max: usize },

    #[error("unsupported file type for {filename}: {mime_type} (accepted: image/png, image/jpeg)")]
    UnsupportedType { filename: String, mime_type: String },
}

/// Vision service errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Retryable failure of a single call (timeout, 5xx, rate limit)
    #[error("transient vision service failure: {reason}")]
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },

    /// Non-retryable failure (bad request, bad credentials)
    #[error("vision service rejected the request: {0}")]
    Fatal(String),

    #[error("vision service unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ProviderError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Model output could not be interpreted as product data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("vision model returned an empty response")]
    EmptyOutput,

    #[error("could not find product data in vision model response")]
    NoStructuredContent,
}

/// Batch-level faults. Any of these turns the whole request into a 500.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("internal error: no outcome recorded for item {index}")]
    MissingOutcome { index: usize },

    #[error("internal error: duplicate outcome for item {index}")]
    DuplicateOutcome { index: usize },

    #[error("internal error: outcome index {index} out of range for batch of {len}")]
    OutcomeOutOfRange { index: usize, len: usize },

    #[error("failed to schedule analysis work: {0}")]
    SchedulingFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be > 0")]
    MustBePositive { key: &'static str },

    #[error("MAX_FILES must be between 1 and 10, got {0}")]
    InvalidMaxFiles(usize),

    #[error("Backoff base delay ({base_ms}ms) exceeds max delay ({max_ms}ms)")]
    InvalidBackoff { base_ms: u64, max_ms: u64 },
}

pub type ProviderResult<T> = Result<T, ProviderError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
