//! Tolerant extraction of JSON from model replies.
//!
//! Models wrap JSON in Markdown fences, prepend chatter, or return plain prose.
//! Nothing here fails: callers get either a [`serde_json::Value`] or `None`
//! and decide how to degrade.

use serde_json::{Map, Value};

/// Result of a tolerant parse: a normalised list, or nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// At least one item.
    Items(Vec<T>),
    /// Input was empty or held no items.
    Empty,
}

impl<T> Parsed<T> {
    /// Wraps a list, mapping an empty list to [`Parsed::Empty`].
    pub fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Parsed::Empty
        } else {
            Parsed::Items(items)
        }
    }

    /// Returns the items, or an empty list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Parsed::Items(items) => items,
            Parsed::Empty => Vec::new(),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        match self {
            Parsed::Items(items) => items.len(),
            Parsed::Empty => 0,
        }
    }

    /// Returns `true` for [`Parsed::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Parsed::Empty)
    }
}

/// Finds the JSON document inside a model reply.
///
/// Tries, in order: the whole text, the body of the first fenced code block,
/// and the span from the first `[`/`{` to the last `]`/`}`.
pub fn extract_json(raw: &str) -> Option<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    if let Some(body) = fenced_body(text) {
        if let Ok(value) = serde_json::from_str(body.trim()) {
            return Some(value);
        }
    }
    let start = text.find(['[', '{'])?;
    let end = text.rfind([']', '}'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the info string (e.g. `json`) up to the end of the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(&body[..close])
}

/// Returns the first non-empty string among `keys`, reading numbers as text.
pub(crate) fn first_text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Returns the first array found among `keys`.
pub(crate) fn first_array<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| object.get(*key).and_then(Value::as_array))
}
