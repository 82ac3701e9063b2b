//! Perplexity chat completions.
//!
//! Perplexity does not expose its queries. Retrieved pages arrive at the
//! response level (`search_results`, or the older bare `citations` URL list)
//! and the answer cites them with bracketed `[n]` markers.

use serde_json::Value;

use super::{array_at, field, ranked_sources, required_array, str_at, url_and_title};
use crate::types::{NormalizedAnswer, Provider, RawCitation};

pub(super) fn map(raw: &Value) -> crate::Result<NormalizedAnswer> {
    let choices = required_array(raw, "choices", Provider::Perplexity)?;
    let mut answer = NormalizedAnswer::default();

    answer.answer_text = choices
        .first()
        .and_then(|choice| field(choice, &["message"]))
        .and_then(|message| str_at(message, &["content"]))
        .unwrap_or_default()
        .to_string();

    let search_results: Vec<(String, Option<String>)> = array_at(raw, &["search_results"])
        .iter()
        .filter_map(|r| url_and_title(r, &["url"]))
        .collect();
    let citation_urls: Vec<String> = array_at(raw, &["citations"])
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    answer.response_sources = if search_results.is_empty() {
        ranked_sources(citation_urls.iter().map(|u| (u.clone(), None)), 1)
    } else {
        ranked_sources(search_results.iter().cloned(), 1)
    };

    // Markers index the `citations` list when present.
    let marker_targets: Vec<(String, Option<String>)> = if citation_urls.is_empty() {
        search_results
    } else {
        citation_urls
            .into_iter()
            .map(|url| {
                let title = search_results
                    .iter()
                    .find(|(u, _)| *u == url)
                    .and_then(|(_, t)| t.clone());
                (url, title)
            })
            .collect()
    };

    answer.raw_citations = citation_markers(&answer.answer_text)
        .into_iter()
        .filter_map(|(number, position)| {
            let (url, title) = number
                .checked_sub(1)
                .and_then(|i| marker_targets.get(i))?
                .clone();
            Some(RawCitation {
                url,
                title,
                position: Some(position),
            })
        })
        .collect();

    Ok(answer)
}

/// Find `[n]` markers, returning `(n, char offset)` in order of appearance.
fn citation_markers(text: &str) -> Vec<(usize, u32)> {
    let chars: Vec<char> = text.chars().collect();
    let mut markers = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' {
            let digits: String = chars[i + 1..]
                .iter()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let close = i + 1 + digits.len();
            if !digits.is_empty() && digits.len() <= 3 && chars.get(close) == Some(&']') {
                if let Ok(number) = digits.parse::<usize>() {
                    markers.push((number, u32::try_from(i).unwrap_or(u32::MAX)));
                }
                i = close + 1;
                continue;
            }
        }
        i += 1;
    }
    markers
}
