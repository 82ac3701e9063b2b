//! Gemini `generateContent` with Google Search grounding.
//!
//! Grounding metadata lists the issued queries, the retrieved chunks and
//! "supports" that tie answer segments to chunk indices. Chunks are not
//! attributed to individual queries, so they become response-level sources.
//! Both camelCase (REST) and snake_case (SDK dumps) field names are accepted.

use serde_json::Value;

use super::{append_text, array_at, field, ranked_sources, required_array, str_at};
use crate::types::{NormalizedAnswer, Provider, RawCitation, SearchQuery};

pub(super) fn map(raw: &Value) -> crate::Result<NormalizedAnswer> {
    let candidates = required_array(raw, "candidates", Provider::Gemini)?;
    let mut answer = NormalizedAnswer::default();
    let Some(candidate) = candidates.first() else {
        return Ok(answer);
    };

    if let Some(content) = field(candidate, &["content"]) {
        for part in array_at(content, &["parts"]) {
            if let Some(text) = str_at(part, &["text"]) {
                append_text(&mut answer.answer_text, text);
            }
        }
    }

    let Some(grounding) = field(candidate, &["groundingMetadata", "grounding_metadata"]) else {
        return Ok(answer);
    };

    answer.search_queries = array_at(grounding, &["webSearchQueries", "web_search_queries"])
        .iter()
        .filter_map(Value::as_str)
        .zip(0u32..)
        .map(|(query, order_index)| SearchQuery {
            query: query.to_string(),
            order_index,
            sources: Vec::new(),
        })
        .collect();

    // Index-aligned with `groundingChunks`; supports refer to chunks by index.
    let chunks: Vec<Option<(String, Option<String>)>> =
        array_at(grounding, &["groundingChunks", "grounding_chunks"])
            .iter()
            .map(|chunk| {
                let web = field(chunk, &["web"])?;
                let uri = str_at(web, &["uri", "url"])?;
                Some((uri.to_string(), str_at(web, &["title"]).map(str::to_string)))
            })
            .collect();

    answer.response_sources = ranked_sources(chunks.iter().flatten().cloned(), 1);

    for support in array_at(grounding, &["groundingSupports", "grounding_supports"]) {
        let position = field(support, &["segment"])
            .and_then(|segment| field(segment, &["startIndex", "start_index"]))
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());
        let indices = array_at(support, &["groundingChunkIndices", "grounding_chunk_indices"]);
        for index in indices.iter().filter_map(Value::as_u64) {
            let chunk = usize::try_from(index)
                .ok()
                .and_then(|i| chunks.get(i))
                .and_then(Option::as_ref);
            if let Some((url, title)) = chunk {
                answer.raw_citations.push(RawCitation {
                    url: url.clone(),
                    title: title.clone(),
                    // Segments without a start index begin the answer.
                    position: Some(position.unwrap_or(0)),
                });
            }
        }
    }

    Ok(answer)
}
