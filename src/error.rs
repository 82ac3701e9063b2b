//! Error types for the citelens service.

/// Top-level error type for the application package.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration file could not be parsed or failed validation.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP listener could not be bound.
    #[error("server error: {0}")]
    Server(String),

    /// HTTP client for the gateway bridge could not be built.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Error from the citation engine or orchestrator.
    #[error(transparent)]
    Core(#[from] citelens_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AppError>;
