//! # citelens-core
//!
//! Citation analysis for search-augmented LLM answers.
//!
//! Given the raw payload a provider (OpenAI, Gemini, Anthropic, Perplexity)
//! returned for a prompt, this crate extracts the searches the model ran,
//! the pages it retrieved, and the pages its answer cites, then reconciles
//! them into one citation list with aggregate metrics.
//!
//! ## Design
//!
//! - One pure mapper per provider turns its payload into a
//!   [`NormalizedAnswer`](types::NormalizedAnswer)
//! - Citations are matched to retrieved sources by canonical URL
//! - A batch orchestrator runs prompts × models under global and
//!   per-provider concurrency ceilings, with polling and cancellation
//! - Calling providers and persisting results are delegated to the
//!   [`ProviderGateway`] and [`Repository`] traits
//!
//! ## Example
//!
//! ```
//! use citelens_core::{Interaction, Provider};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "choices": [{ "message": { "content": "Tokio is an async runtime [1]." } }],
//!     "citations": ["https://tokio.rs/"]
//! });
//! let interaction = Interaction::analyze("what is tokio?", "sonar", Provider::Perplexity, raw)?;
//! assert_eq!(interaction.metrics.sources_used_count, 1);
//! # Ok::<(), citelens_core::CoreError>(())
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod reconcile;
pub mod repository;
pub mod types;

pub use batch::{
    BatchHandle, BatchId, BatchOrchestrator, BatchState, BatchStatus, BatchStore, TaskError,
    TaskErrorKind, TaskResult, TaskState,
};
pub use config::BatchConfig;
pub use error::{CoreError, GatewayError, RepositoryError, Result};
pub use gateway::ProviderGateway;
pub use repository::{InMemoryRepository, Repository};
pub use types::{
    CitationKind, CitationRecord, Interaction, InteractionId, Metrics, NormalizedAnswer,
    Provider, RawCitation, Reconciliation, SearchQuery, SourceRecord,
};
