//! Anthropic Messages API with the server-side web search tool.
//!
//! The `content` array alternates between `server_tool_use` blocks (the
//! query), `web_search_tool_result` blocks (its results) and `text` blocks
//! whose `citations` point at the pages that back each sentence.

use std::collections::HashMap;

use serde_json::Value;

use super::{append_text, array_at, field, ranked_sources, required_array, str_at, url_and_title};
use crate::types::{NormalizedAnswer, Provider, RawCitation, SearchQuery};

const WEB_SEARCH_TOOL: &str = "web_search";

pub(super) fn map(raw: &Value) -> crate::Result<NormalizedAnswer> {
    let content = required_array(raw, "content", Provider::Anthropic)?;
    let mut answer = NormalizedAnswer::default();
    let mut query_by_tool_id: HashMap<&str, usize> = HashMap::new();
    let mut last_query: Option<usize> = None;

    for block in content {
        match str_at(block, &["type"]) {
            Some("server_tool_use") => {
                if str_at(block, &["name"]).is_some_and(|n| n != WEB_SEARCH_TOOL) {
                    continue;
                }
                let query = field(block, &["input"])
                    .and_then(|input| str_at(input, &["query"]))
                    .unwrap_or_default();
                let index = answer.search_queries.len();
                answer.search_queries.push(SearchQuery {
                    query: query.to_string(),
                    order_index: u32::try_from(index).unwrap_or(u32::MAX),
                    sources: Vec::new(),
                });
                if let Some(id) = str_at(block, &["id"]) {
                    query_by_tool_id.insert(id, index);
                }
                last_query = Some(index);
            }
            Some("web_search_tool_result") => {
                let target = str_at(block, &["tool_use_id"])
                    .and_then(|id| query_by_tool_id.get(id).copied())
                    .or(last_query);
                // An error result carries an object instead of a result list.
                let results = array_at(block, &["content"])
                    .iter()
                    .filter(|r| str_at(r, &["type"]).is_none_or(|t| t == "web_search_result"))
                    .filter_map(|r| url_and_title(r, &["url"]));
                match target {
                    Some(index) => {
                        let sources = &mut answer.search_queries[index].sources;
                        let next_rank = next_rank(sources.len());
                        sources.extend(ranked_sources(results, next_rank));
                    }
                    None => {
                        let next_rank = next_rank(answer.response_sources.len());
                        answer
                            .response_sources
                            .extend(ranked_sources(results, next_rank));
                    }
                }
            }
            Some("text") => {
                let text = str_at(block, &["text"]).unwrap_or_default();
                let offset = append_text(&mut answer.answer_text, text);
                answer.raw_citations.extend(
                    array_at(block, &["citations"])
                        .iter()
                        .filter_map(|c| url_and_title(c, &["url"]))
                        .map(|(url, title)| RawCitation {
                            url,
                            title,
                            position: Some(offset),
                        }),
                );
            }
            _ => {}
        }
    }

    Ok(answer)
}

fn next_rank(existing: usize) -> u32 {
    u32::try_from(existing).unwrap_or(u32::MAX - 1) + 1
}
