//! Error types for the citelens-core crate.
//!
//! Each [`CoreError`] variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`CoreError::code()`].
//! Codes are part of the public API contract and will not change.
//!
//! [`GatewayError`] and [`RepositoryError`] are the errors raised by the two
//! external collaborators. They never escape a batch: the orchestrator
//! classifies them into per-task error entries.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The submitted request is invalid (empty lists, unsupported model).
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    /// No batch is registered under the requested id.
    pub const BATCH_NOT_FOUND: &str = "BATCH_NOT_FOUND";

    /// A provider payload did not have the expected top-level shape.
    pub const MALFORMED_RESPONSE: &str = "MALFORMED_RESPONSE";

    /// Invalid configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
}

/// Errors produced by the public operations of this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The submitted request is invalid. No task was created.
    #[error("[{}] {}", error_codes::INVALID_REQUEST, .0)]
    InvalidRequest(String),

    /// No batch is registered under the requested id.
    #[error("[{}] {}", error_codes::BATCH_NOT_FOUND, .0)]
    BatchNotFound(String),

    /// The payload does not match the expected shape for its provider.
    #[error("[{}] {}", error_codes::MALFORMED_RESPONSE, .0)]
    MalformedResponse(String),

    /// Invalid configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),
}

impl CoreError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::BatchNotFound(_) => error_codes::BATCH_NOT_FOUND,
            Self::MalformedResponse(_) => error_codes::MALFORMED_RESPONSE,
            Self::Config(_) => error_codes::CONFIG_INVALID,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidRequest(m)
            | Self::BatchNotFound(m)
            | Self::MalformedResponse(m)
            | Self::Config(m) => m,
        }
    }
}

/// Convenience type alias for citelens-core results.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Typed failure of a single Provider Gateway call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The provider did not answer in time.
    #[error("provider timed out: {0}")]
    Timeout(String),

    /// The provider rejected the call because of rate limiting.
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    /// Credentials were missing or rejected.
    #[error("provider authentication failed: {0}")]
    AuthError(String),

    /// The provider could not be reached or returned a server error.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Failure to persist an interaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("repository error: {0}")]
pub struct RepositoryError(pub String);
