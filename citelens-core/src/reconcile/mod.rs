//! Citation reconciliation: match citations to retrieved sources.
//!
//! Every raw citation is looked up among the retrieved sources by canonical
//! URL. A hit is a "sources used" citation carrying the source's rank; a
//! miss is an "extra link" the model cited from outside its result set.
//!
//! Reconciliation is pure and deterministic. Hash maps are used for lookup
//! only; output order always follows input order.

pub mod canonical;
mod metrics;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::normalize::normalize;
use crate::types::{
    CitationKind, CitationRecord, NormalizedAnswer, Provider, RawCitation, Reconciliation,
    SearchQuery, SourceRecord,
};

use canonical::canonical_url;

pub use metrics::compute_metrics;

/// Normalized answer plus its reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Provider-independent shape of the raw payload.
    pub answer: NormalizedAnswer,
    /// Reconciled citations and metrics.
    pub reconciliation: Reconciliation,
}

/// Normalize `raw` for `provider`, then reconcile its citations.
///
/// # Errors
///
/// Propagates [`CoreError::MalformedResponse`](crate::CoreError::MalformedResponse)
/// from the normalizer.
pub fn analyze(raw: &serde_json::Value, provider: Provider) -> crate::Result<Analysis> {
    let answer = normalize(raw, provider)?;
    let reconciliation = reconcile(
        &answer.search_queries,
        &answer.response_sources,
        &answer.raw_citations,
    );
    tracing::trace!(
        %provider,
        queries = answer.search_queries.len(),
        citations = reconciliation.citations.len(),
        "payload analyzed"
    );
    Ok(Analysis {
        answer,
        reconciliation,
    })
}

/// Reconcile raw citations against the sources retrieved for one answer.
///
/// Candidate sources are all query sources in query order followed by the
/// response-level sources. When several candidates share a canonical URL the
/// lowest rank wins; ties keep the first encountered.
///
/// Citations are collapsed by canonical URL so each distinct cited URL
/// yields one [`CitationRecord`], in order of first mention.
pub fn reconcile(
    search_queries: &[SearchQuery],
    response_sources: &[SourceRecord],
    raw_citations: &[RawCitation],
) -> Reconciliation {
    let index = best_source_index(search_queries, response_sources);

    let mut citations: Vec<CitationRecord> = Vec::new();
    let mut position_by_key: HashMap<String, usize> = HashMap::new();

    for raw in raw_citations {
        let key = canonical_url(&raw.url);
        if key.is_empty() {
            continue;
        }
        if let Some(&existing) = position_by_key.get(&key) {
            let record = &mut citations[existing];
            if record.title.is_none() {
                record.title = non_empty(raw.title.as_deref());
            }
            continue;
        }

        let matched = index.get(&key).copied();
        let title = non_empty(raw.title.as_deref())
            .or_else(|| matched.and_then(|s| s.title.clone()));
        let record = match matched {
            Some(source) => CitationRecord {
                url: raw.url.clone(),
                title,
                rank: Some(source.rank),
                kind: CitationKind::SourcesUsed,
            },
            None => CitationRecord {
                url: raw.url.clone(),
                title,
                rank: None,
                kind: CitationKind::ExtraLink,
            },
        };
        position_by_key.insert(key, citations.len());
        citations.push(record);
    }

    let metrics = compute_metrics(search_queries, response_sources, &citations);
    Reconciliation { citations, metrics }
}

/// Deduplicate every retrieved source by canonical URL.
///
/// The first occurrence wins (query order, then response-level order), so
/// the result is the ordered "sources found" list.
pub fn dedup_sources(
    search_queries: &[SearchQuery],
    response_sources: &[SourceRecord],
) -> Vec<SourceRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    all_sources(search_queries, response_sources)
        .filter(|source| seen.insert(canonical_url(&source.url)))
        .cloned()
        .collect()
}

pub(crate) fn all_sources<'a>(
    search_queries: &'a [SearchQuery],
    response_sources: &'a [SourceRecord],
) -> impl Iterator<Item = &'a SourceRecord> {
    search_queries
        .iter()
        .flat_map(|q| q.sources.iter())
        .chain(response_sources.iter())
}

/// Map each canonical URL to its best-ranked source.
fn best_source_index<'a>(
    search_queries: &'a [SearchQuery],
    response_sources: &'a [SourceRecord],
) -> HashMap<String, &'a SourceRecord> {
    let mut index: HashMap<String, &SourceRecord> = HashMap::new();
    for source in all_sources(search_queries, response_sources) {
        index
            .entry(canonical_url(&source.url))
            .and_modify(|best| {
                if source.rank < best.rank {
                    *best = source;
                }
            })
            .or_insert(source);
    }
    index
}

fn non_empty(title: Option<&str>) -> Option<String> {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
