//! HTTP bridge to an external provider gateway.
//!
//! The bridge POSTs `{prompt, model, provider}` to one configured endpoint and
//! hands the JSON body back to the orchestrator untouched. Vendor
//! authentication and request shaping live behind that endpoint.

use std::time::Duration;

use async_trait::async_trait;
use citelens_core::{GatewayError, Provider, ProviderGateway};
use serde::Serialize;
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::{AppError, Result};

/// Longest error detail kept from a gateway response body.
const MAX_ERROR_DETAIL: usize = 500;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    provider: Provider,
}

/// [`ProviderGateway`] that forwards each call over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Build a gateway client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Gateway`] if the HTTP client cannot be built.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Gateway(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProviderGateway for HttpGateway {
    async fn send(&self, prompt: &str, model: &str, provider: Provider) -> std::result::Result<Value, GatewayError> {
        tracing::trace!(%model, %provider, "sending prompt to gateway");

        let response = self
            .client
            .post(&self.url)
            .json(&SendRequest {
                prompt,
                model,
                provider,
            })
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            tracing::debug!(status = %status, %model, %provider, "gateway returned error");
            return Err(map_http_error(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Unavailable(format!("gateway returned non-JSON body: {e}")))
    }
}

/// Map an error status and body to a typed gateway error.
pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let detail = extract_error_message(body);

    match status.as_u16() {
        401 | 403 => GatewayError::AuthError(detail),
        429 => GatewayError::RateLimited(detail),
        408 | 504 => GatewayError::Timeout(detail),
        s if s >= 500 => GatewayError::Unavailable(detail),
        _ => GatewayError::Unavailable(format!("HTTP {status}: {detail}")),
    }
}

fn classify_transport_error(err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(format!("gateway request timed out: {err}"))
    } else {
        GatewayError::Unavailable(format!("connection error: {err}"))
    }
}

/// Pull `error.message` out of a JSON error body, else the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(|m| m.chars().take(MAX_ERROR_DETAIL).collect())
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(MAX_ERROR_DETAIL).collect()
            }
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn auth_statuses() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(map_http_error(status, ""), GatewayError::AuthError(_)));
        }
    }

    #[test]
    fn rate_limit_status() {
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"slow down"}}"#,
        );
        assert_eq!(err, GatewayError::RateLimited("slow down".into()));
    }

    #[test]
    fn timeout_statuses() {
        for status in [StatusCode::REQUEST_TIMEOUT, StatusCode::GATEWAY_TIMEOUT] {
            assert!(matches!(map_http_error(status, ""), GatewayError::Timeout(_)));
        }
    }

    #[test]
    fn server_errors_are_unavailable() {
        let err = map_http_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err, GatewayError::Unavailable("upstream down".into()));
    }

    #[test]
    fn other_client_errors_carry_status() {
        let err = map_http_error(StatusCode::NOT_FOUND, "");
        match err {
            GatewayError::Unavailable(msg) => {
                assert!(msg.contains("404"));
                assert!(msg.contains("no response body"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        assert_eq!(extract_error_message(&body).chars().count(), MAX_ERROR_DETAIL);
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(SendRequest {
            prompt: "p",
            model: "sonar",
            provider: Provider::Perplexity,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "prompt": "p", "model": "sonar", "provider": "perplexity" })
        );
    }
}
