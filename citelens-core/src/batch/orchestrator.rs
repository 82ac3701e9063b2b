//! Batch orchestrator: expands prompts × models into tasks and runs them
//! under bounded concurrency.
//!
//! # Task unit
//!
//! 1. Wait for a provider permit, then a global permit, while listening for
//!    cancellation
//! 2. Re-check cancellation under the job lock and move to `Dispatched`
//! 3. Call the gateway once, bounded by the configured timeout
//! 4. Normalize and reconcile the payload into an [`Interaction`]
//! 5. Save it to the repository and mark the task `Completed`
//!
//! Any failure along the way, including a panic, marks only that task
//! `Failed` with a classified [`TaskError`](super::TaskError).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use uuid::Uuid;

use super::job::{BatchJob, BatchStatus};
use super::limits::ConcurrencyLimits;
use super::store::BatchStore;
use super::task::{BatchId, BatchTask, TaskErrorKind, TaskFailure, TaskResult};
use crate::config::BatchConfig;
use crate::error::{CoreError, GatewayError};
use crate::gateway::ProviderGateway;
use crate::repository::Repository;
use crate::types::{Interaction, Provider};

/// Returned by [`BatchOrchestrator::submit`].
#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub batch_id: BatchId,
    /// Snapshot taken right after the tasks were spawned.
    pub status: BatchStatus,
}

/// Shared by every task unit the orchestrator spawns.
struct Runtime {
    config: BatchConfig,
    gateway: Arc<dyn ProviderGateway>,
    repository: Arc<dyn Repository>,
    limits: ConcurrencyLimits,
}

/// Runs batches of (prompt, model) tasks.
///
/// Cheap to clone; clones share the registry and permit pools.
#[derive(Clone)]
pub struct BatchOrchestrator {
    runtime: Arc<Runtime>,
    store: Arc<BatchStore>,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("config", &self.runtime.config)
            .field("batches", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    /// Create an orchestrator with its own batch store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if `config` is invalid.
    pub fn new(
        config: BatchConfig,
        gateway: Arc<dyn ProviderGateway>,
        repository: Arc<dyn Repository>,
    ) -> crate::Result<Self> {
        let store = Arc::new(BatchStore::new(config.max_retained_batches));
        Self::with_store(config, gateway, repository, store)
    }

    /// Create an orchestrator backed by an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if `config` is invalid.
    pub fn with_store(
        config: BatchConfig,
        gateway: Arc<dyn ProviderGateway>,
        repository: Arc<dyn Repository>,
        store: Arc<BatchStore>,
    ) -> crate::Result<Self> {
        config.validate()?;
        let limits = ConcurrencyLimits::from_config(&config);
        Ok(Self {
            runtime: Arc::new(Runtime {
                config,
                gateway,
                repository,
                limits,
            }),
            store,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.runtime.config
    }

    pub fn store(&self) -> &Arc<BatchStore> {
        &self.store
    }

    pub fn limits(&self) -> &ConcurrencyLimits {
        &self.runtime.limits
    }

    /// Validate the request, create one task per (prompt, model) pair, and
    /// start running them.
    ///
    /// Must be awaited inside a Tokio runtime; task units are spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRequest`] if `prompts` or `models` is
    /// empty or any model is unsupported. No task is created in that case.
    pub async fn submit(&self, prompts: Vec<String>, models: Vec<String>) -> crate::Result<BatchHandle> {
        if prompts.is_empty() {
            return Err(CoreError::InvalidRequest("prompts must not be empty".into()));
        }
        if models.is_empty() {
            return Err(CoreError::InvalidRequest("models must not be empty".into()));
        }
        let resolved = self.resolve_models(models)?;

        let batch_id = Uuid::new_v4();
        let job = Arc::new(BatchJob::new(batch_id, prompts, &resolved));
        let total = job.total();
        for evicted in self.store.insert(job.clone()) {
            tracing::debug!(batch_id = %evicted, "batch evicted to make room");
        }

        tracing::info!(
            batch_id = %batch_id,
            total,
            models = resolved.len(),
            "batch submitted"
        );

        for index in 0..total {
            let runtime = self.runtime.clone();
            let job = job.clone();
            tokio::spawn(run_task(runtime, job, index));
        }

        Ok(BatchHandle {
            batch_id,
            status: job.snapshot(),
        })
    }

    /// Snapshot of a batch. Has no side effects.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchNotFound`] for an unknown id.
    pub fn poll(&self, batch_id: &BatchId) -> crate::Result<BatchStatus> {
        Ok(self.job(batch_id)?.snapshot())
    }

    /// Cancel a batch.
    ///
    /// Queued tasks become `Cancelled` at once. Tasks already dispatched run
    /// to completion and keep their outcome. Cancelling again, or cancelling
    /// a finished batch, changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchNotFound`] for an unknown id.
    pub fn cancel(&self, batch_id: &BatchId) -> crate::Result<BatchStatus> {
        let job = self.job(batch_id)?;
        let cancelled = job.cancel();
        if cancelled > 0 {
            tracing::info!(batch_id = %batch_id, cancelled, "batch cancelled");
        } else {
            tracing::debug!(batch_id = %batch_id, "cancel had no queued tasks to stop");
        }
        Ok(job.snapshot())
    }

    /// Wait until every task of a batch is terminal and return the final
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchNotFound`] for an unknown id.
    pub async fn wait(&self, batch_id: &BatchId) -> crate::Result<BatchStatus> {
        let job = self.job(batch_id)?;
        job.wait().await;
        Ok(job.snapshot())
    }

    /// Drop a batch from the registry. Returns `true` if it was present.
    ///
    /// Running task units keep their own handle to the job and still finish.
    pub fn evict(&self, batch_id: &BatchId) -> bool {
        self.store.remove(batch_id)
    }

    fn job(&self, batch_id: &BatchId) -> crate::Result<Arc<BatchJob>> {
        self.store
            .get(batch_id)
            .ok_or_else(|| CoreError::BatchNotFound(batch_id.to_string()))
    }

    fn resolve_models(&self, models: Vec<String>) -> crate::Result<Vec<(String, Provider)>> {
        let mut resolved = Vec::with_capacity(models.len());
        let mut unsupported = Vec::new();
        for model in models {
            match self.runtime.config.provider_for(&model) {
                Some(provider) => resolved.push((model, provider)),
                None => unsupported.push(model),
            }
        }
        if !unsupported.is_empty() {
            return Err(CoreError::InvalidRequest(format!(
                "unsupported model(s): {}",
                unsupported.join(", ")
            )));
        }
        Ok(resolved)
    }
}

async fn run_task(runtime: Arc<Runtime>, job: Arc<BatchJob>, index: usize) {
    let Some(task) = job.task(index) else {
        return;
    };
    let batch_id = job.id();

    let permit = tokio::select! {
        biased;
        () = job.cancellation().cancelled() => {
            tracing::debug!(batch_id = %batch_id, task_index = index, "cancelled while waiting for permits");
            return;
        }
        permit = runtime.limits.acquire(task.provider) => permit,
    };
    let _permit = match permit {
        Ok(permit) => permit,
        Err(err) => {
            if job.try_dispatch(index) {
                job.fail(task.error(TaskFailure::new(TaskErrorKind::Internal, err.to_string())));
            }
            return;
        }
    };

    if !job.try_dispatch(index) {
        tracing::debug!(batch_id = %batch_id, task_index = index, "skipped at dispatch: batch cancelled");
        return;
    }
    tracing::debug!(
        batch_id = %batch_id,
        task_index = index,
        model = %task.model,
        provider = %task.provider,
        "task dispatched"
    );

    let prompt = job.prompt(task.prompt_index).unwrap_or_default().to_string();
    let outcome = AssertUnwindSafe(execute(&runtime, &prompt, &task))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(TaskFailure::new(TaskErrorKind::Internal, panic_message(&*panic))));

    match outcome {
        Ok(result) => {
            tracing::debug!(
                batch_id = %batch_id,
                task_index = index,
                interaction_id = %result.interaction_id,
                "task completed"
            );
            job.complete(result);
        }
        Err(failure) => {
            tracing::warn!(
                batch_id = %batch_id,
                task_index = index,
                model = %task.model,
                provider = %task.provider,
                kind = %failure.kind,
                error = %failure.message,
                "task failed"
            );
            job.fail(task.error(failure));
        }
    }

    if job.is_finished() {
        let status = job.snapshot();
        tracing::info!(
            batch_id = %batch_id,
            completed = status.completed,
            failed = status.failed,
            cancelled = status.cancelled,
            "batch finished"
        );
    }
}

async fn execute(runtime: &Runtime, prompt: &str, task: &BatchTask) -> Result<TaskResult, TaskFailure> {
    let call = runtime.gateway.send(prompt, &task.model, task.provider);
    let raw = match runtime.config.task_timeout() {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            GatewayError::Timeout(format!("no response within {}s", limit.as_secs()))
        })??,
        None => call.await?,
    };

    let interaction = Interaction::analyze(prompt, task.model.clone(), task.provider, raw)?;
    let interaction_id = runtime.repository.save(&interaction).await?;
    Ok(task.result(interaction_id, interaction))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked".to_string()
    }
}
