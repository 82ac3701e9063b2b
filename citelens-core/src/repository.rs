//! Repository collaborator: where completed interactions are persisted.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{Interaction, InteractionId};

/// Persists interaction aggregates.
///
/// `save` is called exactly once per successful task, after normalization
/// and reconciliation, and never for failed or cancelled tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persist `interaction`, returning the id it was stored under.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if the interaction could not be stored.
    async fn save(&self, interaction: &Interaction) -> Result<InteractionId, RepositoryError>;
}

/// Process-local repository.
///
/// Interactions are lost when the process exits. Used by the server binary
/// when no external store is wired in, and by tests.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    entries: Mutex<Vec<(InteractionId, Interaction)>>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored interaction by id.
    pub fn get(&self, id: &str) -> Option<Interaction> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .find(|(stored, _)| stored == id)
            .map(|(_, interaction)| interaction.clone())
    }

    /// Number of stored interactions.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored interactions in insertion order.
    pub fn all(&self) -> Vec<(InteractionId, Interaction)> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save(&self, interaction: &Interaction) -> Result<InteractionId, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let Ok(mut entries) = self.entries.lock() else {
            return Err(RepositoryError("in-memory store poisoned".into()));
        };
        entries.push((id.clone(), interaction.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;
    use serde_json::json;

    fn interaction(prompt: &str) -> Interaction {
        Interaction::analyze(
            prompt,
            "sonar",
            Provider::Perplexity,
            json!({ "choices": [{ "message": { "content": "ok" } }] }),
        )
        .expect("analyze")
    }

    #[tokio::test]
    async fn save_assigns_unique_ids() {
        let repo = InMemoryRepository::new();
        let a = repo.save(&interaction("a")).await.expect("save a");
        let b = repo.save(&interaction("b")).await.expect("save b");
        assert_ne!(a, b);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn get_returns_saved_interaction() {
        let repo = InMemoryRepository::new();
        let id = repo.save(&interaction("find me")).await.expect("save");
        let stored = repo.get(&id).expect("stored");
        assert_eq!(stored.prompt, "find me");
        assert!(repo.get("missing").is_none());
    }

    #[test]
    fn new_repository_is_empty() {
        let repo = InMemoryRepository::new();
        assert!(repo.is_empty());
        assert!(repo.all().is_empty());
    }
}
