//! Core domain types: providers, search queries, sources, citations, and
//! the interaction aggregate handed to the repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Search-augmented LLM services whose payloads can be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// OpenAI Responses API with the web search tool.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini with search grounding.
    Gemini,
    /// Anthropic Messages API with the server-side web search tool.
    Anthropic,
    /// Perplexity chat completions (response-level search results).
    Perplexity,
}

impl Provider {
    /// Stable lower-case identifier used in config files and APIs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::Perplexity => "perplexity",
        }
    }

    /// Returns all provider variants.
    pub fn all() -> &'static [Provider] {
        &[Self::OpenAi, Self::Gemini, Self::Anthropic, Self::Perplexity]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Config(format!("unknown provider: {s}")))
    }
}

/// One web source retrieved by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// URL exactly as the provider reported it.
    pub url: String,
    /// Page title, when the provider supplies one.
    pub title: Option<String>,
    /// Host without scheme, `www.` prefix, port or path.
    pub domain: String,
    /// 1-indexed position within its result list.
    pub rank: u32,
}

/// One search issued by the model while answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The query text.
    pub query: String,
    /// 0-based position at which this query was issued within the answer.
    pub order_index: u32,
    /// Results in provider order.
    pub sources: Vec<SourceRecord>,
}

/// A citation mention as it appears in the raw payload, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCitation {
    /// The cited URL.
    pub url: String,
    /// Title attached to the mention, if any.
    pub title: Option<String>,
    /// Character offset into the answer text where the mention is anchored.
    pub position: Option<u32>,
}

/// Canonical shape produced by every provider mapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAnswer {
    /// Final answer text.
    pub answer_text: String,
    /// Searches in the order they were issued.
    pub search_queries: Vec<SearchQuery>,
    /// Sources the provider returned without attributing them to a query.
    pub response_sources: Vec<SourceRecord>,
    /// Citation mentions in order of appearance.
    pub raw_citations: Vec<RawCitation>,
}

/// Whether a citation points into the retrieved result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    /// Matches a retrieved source.
    SourcesUsed,
    /// Cites something outside the retrieved sources.
    ExtraLink,
}

/// A reconciled citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    /// The cited URL, as first mentioned.
    pub url: String,
    /// Title from the mention, or from the matched source.
    pub title: Option<String>,
    /// Rank of the matched source; `None` for an extra link.
    pub rank: Option<u32>,
    /// Classification derived from `rank`.
    pub kind: CitationKind,
}

/// Aggregate metrics over one answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Distinct canonical URLs across all retrieved sources.
    pub sources_found: usize,
    /// Distinct canonical URLs among matched citations.
    pub sources_used_count: usize,
    /// Citations with no matching source.
    pub extra_links_count: usize,
    /// Mean rank of matched citations.
    pub avg_rank: Option<f64>,
}

/// Output of the reconciliation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// One record per distinct cited URL, in first-mention order.
    pub citations: Vec<CitationRecord>,
    /// Aggregate metrics.
    pub metrics: Metrics,
}

/// Identifier assigned by the repository to a saved interaction.
pub type InteractionId = String;

/// Everything recorded for one successful (prompt, model) call.
///
/// Created once per successful task and handed to the repository; the core
/// never mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Prompt text sent to the provider.
    pub prompt: String,
    /// Model identifier as submitted.
    pub model: String,
    /// Provider the model resolved to.
    pub provider: Provider,
    /// Final answer text.
    pub answer_text: String,
    /// Searches in issue order.
    pub search_queries: Vec<SearchQuery>,
    /// Deduplicated "sources found" list.
    pub sources: Vec<SourceRecord>,
    /// Reconciled citations.
    pub citations: Vec<CitationRecord>,
    /// Aggregate metrics.
    pub metrics: Metrics,
    /// Untouched provider payload, kept for reprocessing and audits.
    pub raw_payload: serde_json::Value,
}

impl Interaction {
    /// Normalize and reconcile `raw_payload`, producing a complete interaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedResponse`] if the payload does not have
    /// the top-level shape expected for `provider`.
    pub fn analyze(
        prompt: impl Into<String>,
        model: impl Into<String>,
        provider: Provider,
        raw_payload: serde_json::Value,
    ) -> crate::Result<Self> {
        let analysis = crate::reconcile::analyze(&raw_payload, provider)?;
        let sources = crate::reconcile::dedup_sources(
            &analysis.answer.search_queries,
            &analysis.answer.response_sources,
        );
        Ok(Self {
            prompt: prompt.into(),
            model: model.into(),
            provider,
            answer_text: analysis.answer.answer_text,
            search_queries: analysis.answer.search_queries,
            sources,
            citations: analysis.reconciliation.citations,
            metrics: analysis.reconciliation.metrics,
            raw_payload,
        })
    }

    /// Rebuild all derived fields from the stored raw payload.
    ///
    /// Identical payloads always reprocess to identical interactions.
    pub fn reprocess(&self) -> crate::Result<Self> {
        Self::analyze(
            self.prompt.clone(),
            self.model.clone(),
            self.provider,
            self.raw_payload.clone(),
        )
    }
}
