//! A single batch job: its tasks, counters, and completion signal.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::task::{
    expand_tasks, BatchId, BatchTask, TaskError, TaskOutcome, TaskResult, TaskState,
};
use crate::types::Provider;

/// Aggregate state of a batch.
///
/// A batch is never `Failed` as a whole: individual task failures are
/// reported in [`BatchStatus::errors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// At least one task is queued or in flight.
    Running,
    /// Every task is terminal.
    Completed,
}

/// Per-task line in a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_index: usize,
    pub prompt_index: usize,
    pub model: String,
    pub provider: Provider,
    pub state: TaskState,
}

/// Point-in-time snapshot of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: BatchId,
    pub state: BatchState,
    pub submitted_at: DateTime<Utc>,
    pub cancel_requested: bool,
    pub total: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Every task in task-index order.
    pub tasks: Vec<TaskSummary>,
    /// Completed task results in task-index order.
    pub results: Vec<TaskResult>,
    /// Failed task errors in task-index order.
    pub errors: Vec<TaskError>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counters {
    queued: usize,
    in_flight: usize,
    completed: usize,
    failed: usize,
    cancelled: usize,
}

impl Counters {
    fn slot(&mut self, state: TaskState) -> &mut usize {
        match state {
            TaskState::Queued => &mut self.queued,
            TaskState::Dispatched => &mut self.in_flight,
            TaskState::Completed => &mut self.completed,
            TaskState::Failed => &mut self.failed,
            TaskState::Cancelled => &mut self.cancelled,
        }
    }

    fn is_finished(&self) -> bool {
        self.queued == 0 && self.in_flight == 0
    }
}

#[derive(Debug)]
struct JobInner {
    tasks: Vec<BatchTask>,
    counters: Counters,
}

impl JobInner {
    /// Apply a checked transition and keep the counters in step.
    fn transition(&mut self, batch_id: BatchId, index: usize, next: TaskState) -> bool {
        let Some(task) = self.tasks.get_mut(index) else {
            tracing::warn!(batch_id = %batch_id, task_index = index, "transition on unknown task");
            return false;
        };
        let current = task.state;
        if !current.can_transition_to(next) {
            tracing::warn!(
                batch_id = %batch_id,
                task_index = index,
                from = ?current,
                to = ?next,
                "illegal task transition rejected"
            );
            return false;
        }
        task.state = next;
        *self.counters.slot(current) -= 1;
        *self.counters.slot(next) += 1;
        true
    }
}

/// One submitted batch.
///
/// All task state lives behind a single mutex, so every snapshot is
/// internally consistent: `queued + in_flight + completed + failed +
/// cancelled == total` at all times.
#[derive(Debug)]
pub struct BatchJob {
    id: BatchId,
    submitted_at: DateTime<Utc>,
    prompts: Vec<String>,
    cancel: CancellationToken,
    inner: Mutex<JobInner>,
    done: watch::Sender<bool>,
}

impl BatchJob {
    /// Build a job with every task queued.
    ///
    /// `models` pairs each requested model with its resolved provider.
    pub fn new(id: BatchId, prompts: Vec<String>, models: &[(String, Provider)]) -> Self {
        let tasks = expand_tasks(id, prompts.len(), models);
        let counters = Counters {
            queued: tasks.len(),
            ..Counters::default()
        };
        let (done, _) = watch::channel(tasks.is_empty());
        Self {
            id,
            submitted_at: Utc::now(),
            prompts,
            cancel: CancellationToken::new(),
            inner: Mutex::new(JobInner { tasks, counters }),
            done,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Prompt text for `prompt_index`.
    pub fn prompt(&self, prompt_index: usize) -> Option<&str> {
        self.prompts.get(prompt_index).map(String::as_str)
    }

    /// Number of tasks.
    pub fn total(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Clone of the task at `index`.
    pub fn task(&self, index: usize) -> Option<BatchTask> {
        self.lock().tasks.get(index).cloned()
    }

    /// Token fired when the batch is cancelled.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `true` once every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.lock().counters.is_finished()
    }

    /// Move a queued task to `Dispatched`.
    ///
    /// This is the pre-dispatch safe point: returns `false` if the batch was
    /// cancelled or the task is no longer queued, in which case the caller
    /// must not call the gateway.
    pub fn try_dispatch(&self, index: usize) -> bool {
        let mut inner = self.lock();
        if self.cancel.is_cancelled() {
            return false;
        }
        inner.transition(self.id, index, TaskState::Dispatched)
    }

    /// Record a successful result for a dispatched task.
    pub fn complete(&self, result: TaskResult) -> bool {
        let index = result.task_index;
        self.finish(index, TaskState::Completed, TaskOutcome::Completed(result))
    }

    /// Record a failure for a dispatched task.
    pub fn fail(&self, error: TaskError) -> bool {
        let index = error.task_index;
        self.finish(index, TaskState::Failed, TaskOutcome::Failed(error))
    }

    fn finish(&self, index: usize, state: TaskState, outcome: TaskOutcome) -> bool {
        let mut inner = self.lock();
        if !inner.transition(self.id, index, state) {
            return false;
        }
        if let Some(task) = inner.tasks.get_mut(index) {
            task.outcome = Some(outcome);
        }
        if inner.counters.is_finished() {
            self.done.send_replace(true);
        }
        true
    }

    /// Cancel the batch.
    ///
    /// Every queued task becomes `Cancelled` in one critical section.
    /// Dispatched tasks run to completion and keep their outcome. Calling
    /// this again is a no-op. Returns how many tasks this call cancelled.
    pub fn cancel(&self) -> usize {
        let mut inner = self.lock();
        let queued: Vec<usize> = inner
            .tasks
            .iter()
            .filter(|t| t.state == TaskState::Queued)
            .map(|t| t.task_index)
            .collect();
        let cancelled = queued
            .into_iter()
            .filter(|index| inner.transition(self.id, *index, TaskState::Cancelled))
            .count();
        self.cancel.cancel();
        if inner.counters.is_finished() {
            self.done.send_replace(true);
        }
        cancelled
    }

    /// Resolve once every task is terminal.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|finished| *finished).await;
    }

    /// Consistent snapshot of the batch.
    pub fn snapshot(&self) -> BatchStatus {
        let inner = self.lock();
        let counters = inner.counters;
        let mut tasks = Vec::with_capacity(inner.tasks.len());
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for task in &inner.tasks {
            tasks.push(TaskSummary {
                task_index: task.task_index,
                prompt_index: task.prompt_index,
                model: task.model.clone(),
                provider: task.provider,
                state: task.state,
            });
            match &task.outcome {
                Some(TaskOutcome::Completed(result)) => results.push(result.clone()),
                Some(TaskOutcome::Failed(error)) => errors.push(error.clone()),
                None => {}
            }
        }
        BatchStatus {
            batch_id: self.id,
            state: if counters.is_finished() {
                BatchState::Completed
            } else {
                BatchState::Running
            },
            submitted_at: self.submitted_at,
            cancel_requested: self.cancel.is_cancelled(),
            total: inner.tasks.len(),
            queued: counters.queued,
            in_flight: counters.in_flight,
            completed: counters.completed,
            failed: counters.failed,
            cancelled: counters.cancelled,
            tasks,
            results,
            errors,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::task::{TaskErrorKind, TaskFailure};
    use crate::types::Interaction;
    use serde_json::json;
    use uuid::Uuid;

    fn models() -> Vec<(String, Provider)> {
        vec![
            ("sonar".to_string(), Provider::Perplexity),
            ("sonar-pro".to_string(), Provider::Perplexity),
        ]
    }

    fn job() -> BatchJob {
        let prompts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        BatchJob::new(Uuid::new_v4(), prompts, &models())
    }

    fn result_for(job: &BatchJob, index: usize) -> TaskResult {
        let task = job.task(index).expect("task");
        let interaction = Interaction::analyze(
            job.prompt(task.prompt_index).expect("prompt"),
            &task.model,
            task.provider,
            json!({ "choices": [{ "message": { "content": "ok" } }] }),
        )
        .expect("analyze");
        task.result(format!("id-{index}"), interaction)
    }

    fn assert_counts_add_up(status: &BatchStatus) {
        assert_eq!(
            status.queued + status.in_flight + status.completed + status.failed + status.cancelled,
            status.total
        );
    }

    #[test]
    fn new_job_is_all_queued() {
        let job = job();
        let status = job.snapshot();
        assert_eq!(status.total, 6);
        assert_eq!(status.queued, 6);
        assert_eq!(status.state, BatchState::Running);
        assert!(!status.cancel_requested);
        assert_counts_add_up(&status);
    }

    #[test]
    fn dispatch_and_complete_update_counters() {
        let job = job();
        assert!(job.try_dispatch(0));
        let status = job.snapshot();
        assert_eq!(status.in_flight, 1);
        assert_eq!(status.queued, 5);

        assert!(job.complete(result_for(&job, 0)));
        let status = job.snapshot();
        assert_eq!(status.completed, 1);
        assert_eq!(status.results.len(), 1);
        assert_counts_add_up(&status);
    }

    #[test]
    fn complete_without_dispatch_is_rejected() {
        let job = job();
        assert!(!job.complete(result_for(&job, 1)));
        assert_eq!(job.snapshot().completed, 0);
    }

    #[test]
    fn cancel_with_two_completed_cancels_the_rest() {
        let job = job();
        for index in 0..2 {
            assert!(job.try_dispatch(index));
            assert!(job.complete(result_for(&job, index)));
        }
        assert_eq!(job.cancel(), 4);

        let status = job.snapshot();
        assert_eq!(status.completed, 2);
        assert_eq!(status.cancelled, 4);
        assert_eq!(status.failed, 0);
        assert_eq!(status.state, BatchState::Completed);
        assert!(status.cancel_requested);
        assert!(job.is_finished());
        assert_counts_add_up(&status);
    }

    #[test]
    fn cancel_is_idempotent() {
        let job = job();
        assert_eq!(job.cancel(), 6);
        let first = job.snapshot();
        assert_eq!(job.cancel(), 0);
        let second = job.snapshot();
        assert_eq!(first.cancelled, second.cancelled);
        assert_eq!(first.state, second.state);
    }

    #[test]
    fn dispatch_after_cancel_is_refused() {
        let job = job();
        job.cancel();
        assert!(!job.try_dispatch(3));
        assert_eq!(job.snapshot().in_flight, 0);
    }

    #[test]
    fn in_flight_task_drains_after_cancel() {
        let job = job();
        assert!(job.try_dispatch(0));
        assert_eq!(job.cancel(), 5);
        assert_eq!(job.snapshot().state, BatchState::Running);

        assert!(job.complete(result_for(&job, 0)));
        let status = job.snapshot();
        assert_eq!(status.completed, 1);
        assert_eq!(status.cancelled, 5);
        assert_eq!(status.state, BatchState::Completed);
    }

    #[test]
    fn failures_are_reported_in_task_order() {
        let job = job();
        for index in [4, 1] {
            assert!(job.try_dispatch(index));
            let task = job.task(index).expect("task");
            let failure = TaskFailure::new(TaskErrorKind::Timeout, "slow");
            assert!(job.fail(task.error(failure)));
        }
        let status = job.snapshot();
        let indices: Vec<usize> = status.errors.iter().map(|e| e.task_index).collect();
        assert_eq!(indices, vec![1, 4]);
        assert_eq!(status.errors[0].prompt_index, 0);
        assert_eq!(status.errors[0].model, "sonar-pro");
    }

    #[tokio::test]
    async fn wait_resolves_when_all_terminal() {
        let job = std::sync::Arc::new(job());
        let waiter = {
            let job = job.clone();
            tokio::spawn(async move { job.wait().await })
        };
        job.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait resolved")
            .expect("join");
    }
}
