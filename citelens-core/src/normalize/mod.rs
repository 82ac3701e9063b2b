//! Response normalization: provider payload → [`NormalizedAnswer`].
//!
//! Each provider returns its search activity in a structurally different
//! shape. A fixed table maps every [`Provider`] to one pure mapping function;
//! all of them converge on the same canonical output.
//!
//! Mappers fail only when the top-level shape is wrong. Optional sub-fields
//! that are absent or ill-typed are treated as empty.

mod anthropic;
mod gemini;
mod openai;
mod perplexity;

use serde_json::Value;

use crate::error::CoreError;
use crate::reconcile::canonical::canonical_domain;
use crate::types::{NormalizedAnswer, Provider, SourceRecord};

/// A pure function mapping one provider's raw payload.
pub type Mapper = fn(&Value) -> crate::Result<NormalizedAnswer>;

/// Provider → mapper table.
const MAPPERS: [(Provider, Mapper); 4] = [
    (Provider::OpenAi, openai::map as Mapper),
    (Provider::Gemini, gemini::map as Mapper),
    (Provider::Anthropic, anthropic::map as Mapper),
    (Provider::Perplexity, perplexity::map as Mapper),
];

/// Look up the mapping function for `provider`.
pub fn mapper_for(provider: Provider) -> Mapper {
    MAPPERS
        .iter()
        .find(|(p, _)| *p == provider)
        .map(|(_, mapper)| *mapper)
        .unwrap_or(unsupported)
}

/// Normalize one raw provider payload.
///
/// # Errors
///
/// Returns [`CoreError::MalformedResponse`] if `raw` is not a JSON object or
/// lacks the top-level field that identifies the provider's format.
pub fn normalize(raw: &Value, provider: Provider) -> crate::Result<NormalizedAnswer> {
    if !raw.is_object() {
        return Err(CoreError::MalformedResponse(format!(
            "{provider} payload must be a JSON object"
        )));
    }
    mapper_for(provider)(raw)
}

fn unsupported(_raw: &Value) -> crate::Result<NormalizedAnswer> {
    Err(CoreError::MalformedResponse(
        "no mapper registered for provider".into(),
    ))
}

// ── Shared helpers ─────────────────────────────────────────────

/// First present field among `keys` (camelCase / snake_case aliases).
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(*key)).filter(|v| !v.is_null())
}

/// First string field among `keys`.
fn str_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    field(value, keys).and_then(Value::as_str)
}

/// Array field among `keys`, or an empty slice.
fn array_at<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    field(value, keys)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Required top-level array.
fn required_array<'a>(raw: &'a Value, key: &str, provider: Provider) -> crate::Result<&'a [Value]> {
    match raw.get(key) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(CoreError::MalformedResponse(format!(
            "{provider} payload field `{key}` must be an array"
        ))),
        None => Err(CoreError::MalformedResponse(format!(
            "{provider} payload is missing `{key}`"
        ))),
    }
}

/// Build ranked source records, skipping entries without a URL.
///
/// Ranks are assigned consecutively starting at `first_rank`.
fn ranked_sources<I>(entries: I, first_rank: u32) -> Vec<SourceRecord>
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    entries
        .into_iter()
        .filter(|(url, _)| !url.trim().is_empty())
        .zip(first_rank..)
        .map(|((url, title), rank)| SourceRecord {
            domain: canonical_domain(&url),
            url,
            title: title.filter(|t| !t.trim().is_empty()),
            rank,
        })
        .collect()
}

/// `(url, title)` of a JSON source object.
fn url_and_title(item: &Value, url_keys: &[&str]) -> Option<(String, Option<String>)> {
    let url = str_at(item, url_keys)?;
    let title = str_at(item, &["title"]).map(str::to_string);
    Some((url.to_string(), title))
}

/// Append `text` to the answer, returning the character offset it starts at.
fn append_text(answer: &mut String, text: &str) -> u32 {
    let offset = answer.chars().count();
    answer.push_str(text);
    u32::try_from(offset).unwrap_or(u32::MAX)
}
