//! Integration tests for the batch HTTP API.
//!
//! The server binds port 0 and is driven with `reqwest`; an in-process
//! gateway stands in for the providers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use citelens::ApiServer;
use citelens::config::ServerConfig;
use citelens::server::{ErrorResponse, SubmitResponse};
use citelens_core::{
    BatchConfig, BatchOrchestrator, BatchState, BatchStatus, GatewayError, InMemoryRepository,
    Provider, ProviderGateway,
};
use serde_json::{Value, json};
use tokio::sync::Notify;

/// Answers immediately unless the prompt is "hold", which waits for one
/// release.
struct StubGateway {
    release: Notify,
}

#[async_trait]
impl ProviderGateway for StubGateway {
    async fn send(&self, prompt: &str, _: &str, _: Provider) -> Result<Value, GatewayError> {
        if prompt == "hold" {
            self.release.notified().await;
        }
        Ok(json!({
            "choices": [{ "message": { "content": "Answer [1]" } }],
            "citations": ["https://example.com"]
        }))
    }
}

struct Harness {
    server: ApiServer,
    gateway: Arc<StubGateway>,
    client: reqwest::Client,
}

impl Harness {
    async fn start(config: BatchConfig) -> Self {
        let gateway = Arc::new(StubGateway {
            release: Notify::new(),
        });
        let orchestrator =
            BatchOrchestrator::new(config, gateway.clone(), Arc::new(InMemoryRepository::new()))
                .unwrap();
        let server = ApiServer::start(
            orchestrator,
            &ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
        )
        .await
        .unwrap();
        Self {
            server,
            gateway,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.server.addr())
    }

    async fn submit(&self, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/batch"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn poll(&self, batch_id: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/batch/{batch_id}")))
            .send()
            .await
            .unwrap()
    }

    async fn poll_until_done(&self, batch_id: &str) -> BatchStatus {
        for _ in 0..200 {
            let status: BatchStatus = self.poll(batch_id).await.json().await.unwrap();
            if status.state == BatchState::Completed {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {batch_id} did not finish");
    }
}

#[tokio::test]
async fn health_is_ok() {
    let harness = Harness::start(BatchConfig::default()).await;
    let resp = harness.client.get(harness.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn submit_then_poll_to_completion() {
    let harness = Harness::start(BatchConfig::default()).await;
    let resp = harness
        .submit(json!({ "prompts": ["a", "b"], "models": ["sonar", "gpt-4o"] }))
        .await;
    assert_eq!(resp.status(), 202);
    let submitted: SubmitResponse = resp.json().await.unwrap();
    assert_eq!(submitted.status.total, 4);

    let status = harness.poll_until_done(&submitted.batch_id.to_string()).await;
    assert_eq!(status.completed + status.failed, 4);
    // The stub answers in Perplexity's shape, so OpenAI tasks fail to map.
    assert_eq!(status.completed, 2);
    assert!(status
        .errors
        .iter()
        .all(|e| e.kind == citelens_core::TaskErrorKind::MalformedResponse));
}

#[tokio::test]
async fn unsupported_model_is_bad_request() {
    let harness = Harness::start(BatchConfig::default()).await;
    let resp = harness
        .submit(json!({ "prompts": ["a"], "models": ["gpt-2"] }))
        .await;
    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.error.code, "INVALID_REQUEST");
    assert!(body.error.message.contains("gpt-2"));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let harness = Harness::start(BatchConfig::default()).await;
    let resp = harness.submit(json!({ "prompts": "not a list" })).await;
    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.error.code, "INVALID_REQUEST");
}

#[tokio::test]
async fn unknown_batch_is_not_found() {
    let harness = Harness::start(BatchConfig::default()).await;
    let resp = harness.poll(&uuid::Uuid::new_v4().to_string()).await;
    assert_eq!(resp.status(), 404);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.error.code, "BATCH_NOT_FOUND");

    let resp = harness.poll("not-a-uuid").await;
    assert_eq!(resp.status(), 404);

    let resp = harness
        .client
        .post(harness.url("/batch/not-a-uuid/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn cancel_stops_queued_tasks() {
    let config = BatchConfig {
        global_concurrency: 1,
        ..Default::default()
    };
    let harness = Harness::start(config).await;
    let resp = harness
        .submit(json!({ "prompts": ["hold", "hold", "hold"], "models": ["sonar"] }))
        .await;
    let submitted: SubmitResponse = resp.json().await.unwrap();
    let id = submitted.batch_id.to_string();

    // Wait until the held task is in flight.
    for _ in 0..200 {
        let status: BatchStatus = harness.poll(&id).await.json().await.unwrap();
        if status.in_flight == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let resp = harness
        .client
        .post(harness.url(&format!("/batch/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cancelled: BatchStatus = resp.json().await.unwrap();
    assert!(cancelled.cancel_requested);
    assert_eq!(cancelled.cancelled, 2);

    harness.gateway.release.notify_one();
    let status = harness.poll_until_done(&id).await;
    assert_eq!(status.completed, 1);
    assert_eq!(status.cancelled, 2);
    assert_eq!(status.failed, 0);
}

#[tokio::test]
async fn delete_evicts_batch() {
    let harness = Harness::start(BatchConfig::default()).await;
    let submitted: SubmitResponse = harness
        .submit(json!({ "prompts": ["a"], "models": ["sonar"] }))
        .await
        .json()
        .await
        .unwrap();
    let id = submitted.batch_id.to_string();
    harness.poll_until_done(&id).await;

    let resp = harness
        .client
        .delete(harness.url(&format!("/batch/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(harness.poll(&id).await.status(), 404);
}
