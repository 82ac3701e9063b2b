//! HTTP API for submitting, polling, and cancelling batches.
//!
//! ## Endpoints
//!
//! - `POST /batch`: submit prompts × models, `202` with the initial status
//! - `GET /batch/{batch_id}`: current status
//! - `POST /batch/{batch_id}/cancel`: cancel queued tasks
//! - `DELETE /batch/{batch_id}`: drop a batch from the registry
//! - `GET /health`: liveness

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use citelens_core::error::error_codes;
use citelens_core::{BatchId, BatchOrchestrator, BatchStatus, CoreError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{AppError, Result};

/// `POST /batch` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub prompts: Vec<String>,
    pub models: Vec<String>,
}

/// `POST /batch` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub batch_id: BatchId,
    pub status: BatchStatus,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details within an [`ErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code, e.g. `INVALID_REQUEST`.
    pub code: String,
    pub message: String,
}

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::BatchNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::MalformedResponse(_) | CoreError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: err.code(),
            message: err.message().to_owned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_owned(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the API router over `orchestrator`.
pub fn router(orchestrator: BatchOrchestrator) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/batch", post(handle_submit))
        .route("/batch/{batch_id}", get(handle_poll).delete(handle_evict))
        .route("/batch/{batch_id}/cancel", post(handle_cancel))
        .with_state(orchestrator)
}

/// Running HTTP API.
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl ApiServer {
    /// Bind `{config.host}:{config.port}` (port `0` auto-assigns) and start
    /// serving in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Server`] if the listener cannot bind.
    pub async fn start(orchestrator: BatchOrchestrator, config: &ServerConfig) -> Result<Self> {
        let app = router(orchestrator);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| AppError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AppError::Server(format!("failed to get local addr: {e}")))?;

        tracing::info!("citelens API listening on http://{addr}");

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
                tracing::error!("citelens API error: {e}");
            }
        });

        Ok(Self {
            addr,
            shutdown,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the serve task to exit.
    pub async fn stopped(&mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn parse_batch_id(raw: &str) -> std::result::Result<BatchId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::from(CoreError::BatchNotFound(raw.to_owned())))
}

/// `GET /health`
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /batch`
async fn handle_submit(
    State(orchestrator): State<BatchOrchestrator>,
    body: std::result::Result<Json<SubmitRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError {
        status: StatusCode::BAD_REQUEST,
        code: error_codes::INVALID_REQUEST,
        message: rejection.body_text(),
    })?;
    let handle = orchestrator.submit(request.prompts, request.models).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            batch_id: handle.batch_id,
            status: handle.status,
        }),
    ))
}

/// `GET /batch/{batch_id}`
async fn handle_poll(
    State(orchestrator): State<BatchOrchestrator>,
    Path(batch_id): Path<String>,
) -> std::result::Result<Json<BatchStatus>, ApiError> {
    let id = parse_batch_id(&batch_id)?;
    Ok(Json(orchestrator.poll(&id)?))
}

/// `POST /batch/{batch_id}/cancel`
async fn handle_cancel(
    State(orchestrator): State<BatchOrchestrator>,
    Path(batch_id): Path<String>,
) -> std::result::Result<Json<BatchStatus>, ApiError> {
    let id = parse_batch_id(&batch_id)?;
    Ok(Json(orchestrator.cancel(&id)?))
}

/// `DELETE /batch/{batch_id}`
async fn handle_evict(
    State(orchestrator): State<BatchOrchestrator>,
    Path(batch_id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let id = parse_batch_id(&batch_id)?;
    if orchestrator.evict(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CoreError::BatchNotFound(batch_id).into())
    }
}
