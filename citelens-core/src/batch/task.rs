//! Batch task definitions and the per-task state machine.
//!
//! ```text
//! ┌────────┐  permits + not cancelled  ┌────────────┐  success  ┌───────────┐
//! │ Queued ├──────────────────────────►│ Dispatched ├──────────►│ Completed │
//! └───┬────┘                           └─────┬──────┘           └───────────┘
//!     │ batch cancelled                      │ any failure      ┌───────────┐
//!     ▼                                      └─────────────────►│  Failed   │
//! ┌───────────┐                                                 └───────────┘
//! │ Cancelled │
//! └───────────┘
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, GatewayError, RepositoryError};
use crate::types::{Interaction, InteractionId, Provider};

/// Identifier of a batch job.
pub type BatchId = Uuid;

/// Lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for permits.
    Queued,
    /// Holding permits; the gateway call is in flight.
    Dispatched,
    /// Finished successfully and persisted.
    Completed,
    /// Finished with a classified error.
    Failed,
    /// Skipped because the batch was cancelled before dispatch.
    Cancelled,
}

impl TaskState {
    /// Returns `true` for states a task never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Dispatched)
                | (Self::Queued, Self::Cancelled)
                | (Self::Dispatched, Self::Completed)
                | (Self::Dispatched, Self::Failed)
        )
    }
}

/// Classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The provider could not be reached or returned a server error.
    ProviderUnavailable,
    /// The provider did not answer in time.
    Timeout,
    /// The provider rate limited the call.
    RateLimited,
    /// Credentials were missing or rejected.
    AuthFailed,
    /// The payload did not match the provider's expected shape.
    MalformedResponse,
    /// The interaction could not be persisted.
    Repository,
    /// The task unit itself failed unexpectedly.
    Internal,
}

impl TaskErrorKind {
    /// Stable snake_case name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::MalformedResponse => "malformed_response",
            Self::Repository => "repository",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a task, before it is attached to task identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Error classification.
    pub kind: TaskErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl TaskFailure {
    /// Create a failure of the given kind.
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<GatewayError> for TaskFailure {
    fn from(err: GatewayError) -> Self {
        let kind = match &err {
            GatewayError::Timeout(_) => TaskErrorKind::Timeout,
            GatewayError::RateLimited(_) => TaskErrorKind::RateLimited,
            GatewayError::AuthError(_) => TaskErrorKind::AuthFailed,
            GatewayError::Unavailable(_) => TaskErrorKind::ProviderUnavailable,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<CoreError> for TaskFailure {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::MalformedResponse(_) => TaskErrorKind::MalformedResponse,
            _ => TaskErrorKind::Internal,
        };
        Self::new(kind, err.message())
    }
}

impl From<RepositoryError> for TaskFailure {
    fn from(err: RepositoryError) -> Self {
        Self::new(TaskErrorKind::Repository, err.0)
    }
}

/// Structured error entry reported for a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Index of the task within its batch.
    pub task_index: usize,
    /// Index of the prompt within the submitted prompt list.
    pub prompt_index: usize,
    /// Model the task targeted.
    pub model: String,
    /// Provider hosting the model.
    pub provider: Provider,
    /// Error classification.
    pub kind: TaskErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Result entry reported for a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Index of the task within its batch.
    pub task_index: usize,
    /// Index of the prompt within the submitted prompt list.
    pub prompt_index: usize,
    /// Model the task targeted.
    pub model: String,
    /// Provider hosting the model.
    pub provider: Provider,
    /// Id the repository assigned to the saved interaction.
    pub interaction_id: InteractionId,
    /// The saved interaction.
    pub interaction: Interaction,
}

/// Terminal payload of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task completed.
    Completed(TaskResult),
    /// The task failed.
    Failed(TaskError),
}

/// One (prompt, model) unit of work within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTask {
    /// Owning batch.
    pub batch_id: BatchId,
    /// Stable position in the prompt-major expansion.
    pub task_index: usize,
    /// Index of the prompt within the submitted prompt list.
    pub prompt_index: usize,
    /// Model to call.
    pub model: String,
    /// Provider hosting the model.
    pub provider: Provider,
    /// Current state.
    pub state: TaskState,
    /// Set once the task completes or fails.
    pub outcome: Option<TaskOutcome>,
}

impl BatchTask {
    /// Create a queued task.
    pub fn new(
        batch_id: BatchId,
        task_index: usize,
        prompt_index: usize,
        model: impl Into<String>,
        provider: Provider,
    ) -> Self {
        Self {
            batch_id,
            task_index,
            prompt_index,
            model: model.into(),
            provider,
            state: TaskState::Queued,
            outcome: None,
        }
    }

    /// Attach this task's identity to a failure.
    pub fn error(&self, failure: TaskFailure) -> TaskError {
        TaskError {
            task_index: self.task_index,
            prompt_index: self.prompt_index,
            model: self.model.clone(),
            provider: self.provider,
            kind: failure.kind,
            message: failure.message,
        }
    }

    /// Attach this task's identity to a saved interaction.
    pub fn result(&self, interaction_id: InteractionId, interaction: Interaction) -> TaskResult {
        TaskResult {
            task_index: self.task_index,
            prompt_index: self.prompt_index,
            model: self.model.clone(),
            provider: self.provider,
            interaction_id,
            interaction,
        }
    }
}

/// Expand prompts × models into tasks, prompt-major.
///
/// All models for prompt 0 come first, then prompt 1, and so on. Task
/// indices follow this order and never change.
pub fn expand_tasks(batch_id: BatchId, prompt_count: usize, models: &[(String, Provider)]) -> Vec<BatchTask> {
    (0..prompt_count)
        .flat_map(|prompt_index| {
            models
                .iter()
                .map(move |(model, provider)| (prompt_index, model, *provider))
        })
        .enumerate()
        .map(|(task_index, (prompt_index, model, provider))| {
            BatchTask::new(batch_id, task_index, prompt_index, model.clone(), provider)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(TaskState::Queued.can_transition_to(TaskState::Dispatched));
        assert!(TaskState::Queued.can_transition_to(TaskState::Cancelled));
        assert!(TaskState::Dispatched.can_transition_to(TaskState::Completed));
        assert!(TaskState::Dispatched.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!TaskState::Queued.can_transition_to(TaskState::Completed));
        assert!(!TaskState::Dispatched.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Completed.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Cancelled.can_transition_to(TaskState::Dispatched));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Dispatched.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[test]
    fn expansion_is_prompt_major() {
        let models = vec![
            ("gpt-4o".to_string(), Provider::OpenAi),
            ("sonar".to_string(), Provider::Perplexity),
        ];
        let tasks = expand_tasks(Uuid::nil(), 3, &models);
        assert_eq!(tasks.len(), 6);
        let order: Vec<(usize, usize, &str)> = tasks
            .iter()
            .map(|t| (t.task_index, t.prompt_index, t.model.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, 0, "gpt-4o"),
                (1, 0, "sonar"),
                (2, 1, "gpt-4o"),
                (3, 1, "sonar"),
                (4, 2, "gpt-4o"),
                (5, 2, "sonar"),
            ]
        );
        assert!(tasks.iter().all(|t| t.state == TaskState::Queued));
    }

    #[test]
    fn gateway_errors_classify() {
        let cases = [
            (GatewayError::Timeout("t".into()), TaskErrorKind::Timeout),
            (GatewayError::RateLimited("r".into()), TaskErrorKind::RateLimited),
            (GatewayError::AuthError("a".into()), TaskErrorKind::AuthFailed),
            (GatewayError::Unavailable("u".into()), TaskErrorKind::ProviderUnavailable),
        ];
        for (err, kind) in cases {
            assert_eq!(TaskFailure::from(err).kind, kind);
        }
    }

    #[test]
    fn malformed_response_classifies() {
        let failure = TaskFailure::from(CoreError::MalformedResponse("missing `output`".into()));
        assert_eq!(failure.kind, TaskErrorKind::MalformedResponse);
        assert_eq!(failure.message, "missing `output`");
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TaskErrorKind::ProviderUnavailable).expect("serialize");
        assert_eq!(json, "\"provider_unavailable\"");
        assert_eq!(TaskErrorKind::RateLimited.to_string(), "rate_limited");
    }
}
