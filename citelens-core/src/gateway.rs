//! Trait definition for the Provider Gateway collaborator.
//!
//! The gateway owns everything vendor-specific about *calling* a model:
//! authentication, HTTP, streaming. The core only needs the final raw JSON
//! payload, or a typed [`GatewayError`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::types::Provider;

/// Sends one prompt to one model and returns the provider's raw payload.
///
/// Called exactly once per dispatched task; the core never retries.
/// Implementations must be `Send + Sync` because task units call the same
/// gateway concurrently.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Send `prompt` to `model`, hosted by `provider`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] describing why the call failed.
    async fn send(&self, prompt: &str, model: &str, provider: Provider)
        -> Result<Value, GatewayError>;
}
