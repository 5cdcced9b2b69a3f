//! Result parsing
//!
//! Extracts the ranked document ids from `root.children`, in backend order.
//! Parsing is total: a missing `root` or `children` is a zero-hit response and
//! yields an empty list. Children without a document id (grouping or summary
//! rows) are skipped.

use serde::Serialize;
use serde_json::Value;

use super::traits::RawResponse;

/// A parsed hit, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// `fields.id`, falling back to the top-level hit `id`
    pub id: String,
    pub relevance: f64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub body: Option<String>,
}

fn children(json: &Value) -> &[Value] {
    json.pointer("/root/children")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_string(hit: &Value, name: &str) -> Option<String> {
    hit.get("fields")
        .and_then(|f| f.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Ranked document ids from a raw response
pub fn parse(raw: &RawResponse) -> Vec<String> {
    parse_json(&raw.json)
}

/// Ranked document ids from a response body
pub fn parse_json(json: &Value) -> Vec<String> {
    children(json)
        .iter()
        .filter_map(|hit| hit.get("fields").and_then(|f| f.get("id")).and_then(id_string))
        .collect()
}

/// Hits with their display fields; children without `fields` are skipped
pub fn parse_hits(raw: &RawResponse) -> Vec<SearchHit> {
    children(&raw.json)
        .iter()
        .filter(|hit| hit.get("fields").is_some())
        .filter_map(|hit| {
            let id = hit
                .get("fields")
                .and_then(|f| f.get("id"))
                .and_then(id_string)
                .or_else(|| hit.get("id").and_then(id_string))?;
            Some(SearchHit {
                id,
                relevance: hit.get("relevance").and_then(Value::as_f64).unwrap_or(0.0),
                title: field_string(hit, "title"),
                url: field_string(hit, "url"),
                body: field_string(hit, "body"),
            })
        })
        .collect()
}
