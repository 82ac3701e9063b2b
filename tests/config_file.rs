//! Loading service configuration from TOML files on disk.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::io::Write;

use citelens::{AppConfig, AppError};
use citelens_core::Provider;

#[test]
fn full_file_loads_and_validates() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
host = "0.0.0.0"
port = 9090

[gateway]
url = "https://gateway.internal/v1/send"
timeout_secs = 30

[batch]
global_concurrency = 16
default_provider_concurrency = 3
task_timeout_secs = 45
max_retained_batches = 10

[batch.provider_concurrency]
anthropic = 1

[batch.models]
"claude-opus-4" = "anthropic"
"#
    )
    .unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.gateway.timeout_secs, 30);

    let batch = config.validate().unwrap();
    assert_eq!(batch.global_concurrency, 16);
    assert_eq!(batch.concurrency_for(Provider::Anthropic), 1);
    // Only anthropic is listed, so the others use the default pool size.
    assert_eq!(batch.concurrency_for(Provider::Gemini), 3);
    assert_eq!(batch.task_timeout_secs, Some(45));
    assert_eq!(batch.max_retained_batches, 10);
    assert_eq!(batch.provider_for("claude-opus-4"), Some(Provider::Anthropic));
}

#[test]
fn empty_file_is_all_defaults() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = AppConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.port, 8080);
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_toml_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[server\nport = ").unwrap();
    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Io(_)));
}
