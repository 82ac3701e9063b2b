//! Aggregate metrics over one reconciled answer.

use std::collections::HashSet;

use crate::types::{CitationRecord, Metrics, SearchQuery, SourceRecord};

use super::all_sources;
use super::canonical::canonical_url;

/// Compute [`Metrics`] from the retrieved sources and reconciled citations.
///
/// - `sources_found`: distinct canonical URLs across all sources
/// - `sources_used_count`: distinct canonical URLs among matched citations
/// - `extra_links_count`: unmatched citations
/// - `avg_rank`: mean rank of matched citations, `None` when nothing matched
pub fn compute_metrics(
    search_queries: &[SearchQuery],
    response_sources: &[SourceRecord],
    citations: &[CitationRecord],
) -> Metrics {
    let sources_found = all_sources(search_queries, response_sources)
        .map(|s| canonical_url(&s.url))
        .collect::<HashSet<_>>()
        .len();

    let mut used: HashSet<String> = HashSet::new();
    let mut rank_sum: u64 = 0;
    let mut rank_count: u64 = 0;
    let mut extra_links_count = 0;

    for citation in citations {
        match citation.rank {
            Some(rank) => {
                if used.insert(canonical_url(&citation.url)) {
                    rank_sum += u64::from(rank);
                    rank_count += 1;
                }
            }
            None => extra_links_count += 1,
        }
    }

    let avg_rank = (rank_count > 0).then(|| rank_sum as f64 / rank_count as f64);

    Metrics {
        sources_found,
        sources_used_count: used.len(),
        extra_links_count,
        avg_rank,
    }
}
