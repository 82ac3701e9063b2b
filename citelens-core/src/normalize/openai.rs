//! OpenAI Responses API with the web search tool.
//!
//! The `output` array interleaves `web_search_call` items (one query with
//! its sources each) and `message` items whose `output_text` parts carry
//! `url_citation` annotations.

use serde_json::Value;

use super::{append_text, array_at, ranked_sources, required_array, str_at, url_and_title};
use crate::types::{NormalizedAnswer, Provider, RawCitation, SearchQuery};

pub(super) fn map(raw: &Value) -> crate::Result<NormalizedAnswer> {
    let output = required_array(raw, "output", Provider::OpenAi)?;
    let mut answer = NormalizedAnswer::default();

    for item in output {
        match str_at(item, &["type"]) {
            Some("web_search_call") => {
                if let Some(query) = search_call_query(item) {
                    answer.search_queries.push(query_with_index(
                        query,
                        answer.search_queries.len(),
                    ));
                }
            }
            Some("message") => {
                for part in array_at(item, &["content"]) {
                    if str_at(part, &["type"]) != Some("output_text") {
                        continue;
                    }
                    let text = str_at(part, &["text"]).unwrap_or_default();
                    let offset = append_text(&mut answer.answer_text, text);
                    answer
                        .raw_citations
                        .extend(array_at(part, &["annotations"]).iter().filter_map(|a| {
                            url_citation(a, offset)
                        }));
                }
            }
            _ => {}
        }
    }

    Ok(answer)
}

/// Query text and sources of a `web_search_call`, if it performed a search.
///
/// `open_page` and `find_in_page` actions do not issue a query and are skipped.
fn search_call_query(item: &Value) -> Option<SearchQuery> {
    let action = item.get("action")?;
    match str_at(action, &["type"]) {
        None | Some("search") => {}
        Some(_) => return None,
    }
    let query = str_at(action, &["query"]).or_else(|| {
        array_at(action, &["queries"])
            .first()
            .and_then(Value::as_str)
    })?;
    let sources = ranked_sources(
        array_at(action, &["sources"])
            .iter()
            .filter_map(|s| url_and_title(s, &["url"])),
        1,
    );
    Some(SearchQuery {
        query: query.to_string(),
        order_index: 0,
        sources,
    })
}

fn query_with_index(mut query: SearchQuery, index: usize) -> SearchQuery {
    query.order_index = u32::try_from(index).unwrap_or(u32::MAX);
    query
}

fn url_citation(annotation: &Value, offset: u32) -> Option<RawCitation> {
    if str_at(annotation, &["type"]) != Some("url_citation") {
        return None;
    }
    let (url, title) = url_and_title(annotation, &["url"])?;
    let start = annotation
        .get("start_index")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok());
    Some(RawCitation {
        url,
        title,
        position: start.map(|s| offset.saturating_add(s)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "id": "resp_123",
            "output": [
                {
                    "type": "web_search_call",
                    "status": "completed",
                    "action": {
                        "type": "search",
                        "query": "best rust web framework",
                        "sources": [
                            { "type": "url", "url": "https://www.arewewebyet.org/" },
                            { "type": "url", "url": "https://github.com/tokio-rs/axum", "title": "axum" }
                        ]
                    }
                },
                {
                    "type": "web_search_call",
                    "action": { "type": "open_page", "url": "https://docs.rs/axum" }
                },
                {
                    "type": "web_search_call",
                    "action": { "type": "search", "query": "axum vs actix" }
                },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [{
                        "type": "output_text",
                        "text": "Axum is a solid choice.",
                        "annotations": [
                            {
                                "type": "url_citation",
                                "url": "https://github.com/tokio-rs/axum",
                                "title": "axum",
                                "start_index": 0,
                                "end_index": 4
                            },
                            { "type": "file_citation", "file_id": "f1" }
                        ]
                    }]
                }
            ]
        })
    }

    #[test]
    fn queries_in_order_with_ranked_sources() {
        let answer = map(&payload()).expect("map");
        assert_eq!(answer.search_queries.len(), 2);
        assert_eq!(answer.search_queries[0].query, "best rust web framework");
        assert_eq!(answer.search_queries[0].order_index, 0);
        assert_eq!(answer.search_queries[1].query, "axum vs actix");
        assert_eq!(answer.search_queries[1].order_index, 1);
        assert!(answer.search_queries[1].sources.is_empty());

        let sources = &answer.search_queries[0].sources;
        assert_eq!(sources[0].rank, 1);
        assert_eq!(sources[0].domain, "arewewebyet.org");
        assert_eq!(sources[1].rank, 2);
        assert_eq!(sources[1].title.as_deref(), Some("axum"));
    }

    #[test]
    fn answer_text_and_url_citations() {
        let answer = map(&payload()).expect("map");
        assert_eq!(answer.answer_text, "Axum is a solid choice.");
        assert_eq!(answer.raw_citations.len(), 1);
        assert_eq!(answer.raw_citations[0].url, "https://github.com/tokio-rs/axum");
        assert_eq!(answer.raw_citations[0].position, Some(0));
        assert!(answer.response_sources.is_empty());
    }

    #[test]
    fn no_search_yields_empty_lists() {
        let raw = json!({
            "output": [{
                "type": "message",
                "content": [{ "type": "output_text", "text": "Hello" }]
            }]
        });
        let answer = map(&raw).expect("map");
        assert_eq!(answer.answer_text, "Hello");
        assert!(answer.search_queries.is_empty());
        assert!(answer.raw_citations.is_empty());
    }

    #[test]
    fn second_message_citation_positions_are_offset() {
        let raw = json!({
            "output": [
                { "type": "message", "content": [{ "type": "output_text", "text": "abc" }] },
                { "type": "message", "content": [{
                    "type": "output_text",
                    "text": "def",
                    "annotations": [{ "type": "url_citation", "url": "https://x.com", "start_index": 1 }]
                }] }
            ]
        });
        let answer = map(&raw).expect("map");
        assert_eq!(answer.raw_citations[0].position, Some(4));
    }

    #[test]
    fn missing_output_is_malformed() {
        let err = map(&json!({ "id": "resp" })).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_RESPONSE");
    }
}
