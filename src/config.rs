//! Service configuration loaded from TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use citelens_core::{BatchConfig, Provider};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CITELENS_CONFIG";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP API listener.
    pub server: ServerConfig,
    /// Provider gateway bridge.
    pub gateway: GatewayConfig,
    /// Batch orchestration.
    pub batch: BatchSection,
}

/// HTTP API listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

/// Where the provider gateway lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Endpoint accepting `{prompt, model, provider}` and returning the raw
    /// provider payload.
    pub url: String,
    /// HTTP client timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8787/v1/send".to_owned(),
            timeout_secs: 120,
        }
    }
}

/// `[batch]` section. Keys are plain strings in TOML and are converted into
/// a [`BatchConfig`] by [`BatchSection::to_batch_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub global_concurrency: usize,
    pub default_provider_concurrency: usize,
    /// Provider name (`openai`, `gemini`, ...) to permit pool size.
    pub provider_concurrency: BTreeMap<String, usize>,
    /// `0` disables the per-task timeout.
    pub task_timeout_secs: u64,
    pub max_retained_batches: usize,
    /// Extra or overriding model → provider name entries, merged over the
    /// built-in catalog.
    pub models: BTreeMap<String, String>,
}

impl Default for BatchSection {
    fn default() -> Self {
        let defaults = BatchConfig::default();
        Self {
            global_concurrency: defaults.global_concurrency,
            default_provider_concurrency: defaults.default_provider_concurrency,
            provider_concurrency: defaults
                .provider_concurrency
                .iter()
                .map(|(p, n)| (p.name().to_owned(), *n))
                .collect(),
            task_timeout_secs: defaults.task_timeout_secs.unwrap_or(0),
            max_retained_batches: defaults.max_retained_batches,
            models: BTreeMap::new(),
        }
    }
}

impl BatchSection {
    /// Resolve provider names and build a validated [`BatchConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] for an unknown provider name, and
    /// [`AppError::Core`] if the resulting config fails validation.
    pub fn to_batch_config(&self) -> Result<BatchConfig> {
        let provider_concurrency = self
            .provider_concurrency
            .iter()
            .map(|(name, n)| Ok((parse_provider(name)?, *n)))
            .collect::<Result<BTreeMap<Provider, usize>>>()?;

        let mut models = citelens_core::config::default_model_catalog();
        for (model, provider) in &self.models {
            models.insert(model.clone(), parse_provider(provider)?);
        }

        let config = BatchConfig {
            global_concurrency: self.global_concurrency,
            provider_concurrency,
            default_provider_concurrency: self.default_provider_concurrency,
            task_timeout_secs: (self.task_timeout_secs > 0).then_some(self.task_timeout_secs),
            max_retained_batches: self.max_retained_batches,
            models,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_provider(name: &str) -> Result<Provider> {
    name.parse()
        .map_err(|_| AppError::Config(format!("unknown provider: {name}")))
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Locate the config file: `CITELENS_CONFIG`, else the first CLI
    /// argument, else none.
    pub fn locate(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| args.into_iter().next().map(PathBuf::from))
    }

    /// Load from `path` if given, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a given file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check every section, returning the batch config the orchestrator
    /// should run with.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] for an invalid gateway URL or timeout,
    /// or any error from [`BatchSection::to_batch_config`].
    pub fn validate(&self) -> Result<BatchConfig> {
        let url = url::Url::parse(&self.gateway.url)
            .map_err(|e| AppError::Config(format!("gateway.url {:?}: {e}", self.gateway.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "gateway.url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(AppError::Config(
                "gateway.timeout_secs must be greater than 0".into(),
            ));
        }
        self.batch.to_batch_config()
    }
}
