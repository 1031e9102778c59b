use thiserror::Error;

use crate::providers::CapabilityKind;

// Use anyhow::Result for internal plumbing (config loading, backend constructors)
// Use thiserror for errors callers need to match on

/// Errors surfaced by the provider engine
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unknown provider type: {0}")]
    UnknownProviderType(String),

    #[error("Provider type already registered: {0}")]
    DuplicateProviderType(String),

    #[error("Provider '{type_name}' implements {actual}, but {required} was requested")]
    CapabilityMismatch {
        type_name: String,
        required: CapabilityKind,
        actual: CapabilityKind,
    },

    #[error("Failed to instantiate provider '{type_name}': {source}")]
    ProviderInstantiationFailure {
        type_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("API call failed with status {status}: {body}")]
    ApiCallFailure { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    HttpTransportError(String),

    #[error("Failed to parse provider response: {0}")]
    ResponseParseError(String),

    #[error("Stream transport error: {0}")]
    StreamTransportError(String),

    #[error("Malformed stream chunk ({message}): {line}")]
    StreamChunkParseError { line: String, message: String },

    #[error("Embedding batch starting at index {start_index} failed after {attempts} attempts: {source}")]
    BatchEmbeddingExhausted {
        start_index: usize,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request validation failed: {0}")]
    ValidationError(String),
}

impl AppError {
    pub fn api_call_failure(status: u16, body: impl Into<String>) -> Self {
        Self::ApiCallFailure {
            status,
            body: body.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::HttpTransportError(msg.into())
    }

    pub fn stream_transport(msg: impl Into<String>) -> Self {
        Self::StreamTransportError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Whether a non-stream call may be retried after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::HttpTransportError(_) => true,
            AppError::ApiCallFailure { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convert from anyhow::Error to AppError for configuration plumbing
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Application error: {:?}", err);
        AppError::ConfigError(format!("{:#}", err))
    }
}

/// Helper type for results that use AppError
pub type AppResult<T> = Result<T, AppError>;

/// Helper type for results that use anyhow for internal operations
pub type AnyhowResult<T> = anyhow::Result<T>;
