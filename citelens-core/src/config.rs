//! Batch configuration with sensible defaults.
//!
//! [`BatchConfig`] controls concurrency ceilings, per-task timeouts, how
//! many finished batches are retained, and which model identifiers are
//! supported (and which provider hosts each of them).

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::CoreError;
use crate::types::Provider;

/// Configuration for the batch orchestrator.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Size of the global permit pool shared by every task of every batch.
    pub global_concurrency: usize,
    /// Per-provider permit pool sizes.
    pub provider_concurrency: BTreeMap<Provider, usize>,
    /// Pool size for providers missing from `provider_concurrency`.
    pub default_provider_concurrency: usize,
    /// Upper bound on one gateway call, in seconds. `None` disables it.
    pub task_timeout_secs: Option<u64>,
    /// How many batches the registry keeps before evicting finished ones.
    pub max_retained_batches: usize,
    /// Supported models and the provider that hosts each.
    pub models: BTreeMap<String, Provider>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 8,
            provider_concurrency: Provider::all().iter().map(|p| (*p, 2)).collect(),
            default_provider_concurrency: 2,
            task_timeout_secs: Some(120),
            max_retained_batches: 256,
            models: default_model_catalog(),
        }
    }
}

/// Built-in model catalog.
pub fn default_model_catalog() -> BTreeMap<String, Provider> {
    [
        ("gpt-4o-search-preview", Provider::OpenAi),
        ("gpt-4.1", Provider::OpenAi),
        ("gpt-4o", Provider::OpenAi),
        ("gemini-2.0-flash", Provider::Gemini),
        ("gemini-2.5-flash", Provider::Gemini),
        ("gemini-2.5-pro", Provider::Gemini),
        ("claude-3-7-sonnet-latest", Provider::Anthropic),
        ("claude-sonnet-4-20250514", Provider::Anthropic),
        ("sonar", Provider::Perplexity),
        ("sonar-pro", Provider::Perplexity),
    ]
    .into_iter()
    .map(|(model, provider)| (model.to_string(), provider))
    .collect()
}

impl BatchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `global_concurrency` must be greater than 0
    /// - every provider pool size, and the default, must be greater than 0
    /// - `task_timeout_secs`, when set, must be greater than 0
    /// - `max_retained_batches` must be greater than 0
    /// - `models` must not be empty
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.global_concurrency == 0 {
            return Err(CoreError::Config(
                "global_concurrency must be greater than 0".into(),
            ));
        }
        if self.default_provider_concurrency == 0 {
            return Err(CoreError::Config(
                "default_provider_concurrency must be greater than 0".into(),
            ));
        }
        if let Some((provider, _)) = self.provider_concurrency.iter().find(|(_, n)| **n == 0) {
            return Err(CoreError::Config(format!(
                "provider_concurrency for {provider} must be greater than 0"
            )));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(CoreError::Config(
                "task_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.max_retained_batches == 0 {
            return Err(CoreError::Config(
                "max_retained_batches must be greater than 0".into(),
            ));
        }
        if self.models.is_empty() {
            return Err(CoreError::Config(
                "at least one model must be configured".into(),
            ));
        }
        Ok(())
    }

    /// Permit pool size for `provider`.
    pub fn concurrency_for(&self, provider: Provider) -> usize {
        self.provider_concurrency
            .get(&provider)
            .copied()
            .unwrap_or(self.default_provider_concurrency)
    }

    /// Provider hosting `model`, if the model is supported.
    pub fn provider_for(&self, model: &str) -> Option<Provider> {
        self.models.get(model).copied()
    }

    /// Gateway call timeout, if enabled.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}
