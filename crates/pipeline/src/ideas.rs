//! Ideation sub-stage: idea cards and the user's selection.
//!
//! The ideation model answers in several shapes: a bare array, an object with
//! an `ideas` or `themes` array, arrays of strings, or prose. [`parse_ideas`]
//! folds all of them into one list of [`Idea`] cards. The selected cards
//! become the research stage's context.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extract::{extract_json, first_array, first_text};
use crate::{IdeaId, Parsed};

const TITLE_KEYS: &[&str] = &["title", "theme", "name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "concept", "content", "summary"];
const LIST_KEYS: &[&str] = &["ideas", "themes"];

/// One selectable idea card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    /// Stable identifier used for selection.
    pub id: IdeaId,
    /// Short headline.
    pub title: String,
    /// Longer explanation. May be empty.
    pub description: String,
}

/// Parses ideation output into idea cards. Never fails.
///
/// Text that holds no JSON at all is wrapped as a single card whose
/// description is the raw text, so the user still has something to select.
pub fn parse_ideas(raw: &str) -> Parsed<Idea> {
    let text = raw.trim();
    if text.is_empty() {
        return Parsed::Empty;
    }

    let ideas = match extract_json(text) {
        Some(Value::Array(items)) => ideas_from_array(&items),
        Some(Value::Object(object)) => match first_array(&object, LIST_KEYS) {
            Some(items) => ideas_from_array(items),
            None if first_text(&object, TITLE_KEYS).is_some() => {
                vec![idea_from_object(0, &object)]
            }
            None => vec![wrap_raw(text)],
        },
        Some(Value::String(s)) if !s.trim().is_empty() => vec![wrap_raw(&s)],
        Some(_) => Vec::new(),
        None => vec![wrap_raw(text)],
    };
    Parsed::from_vec(dedupe_ids(ideas))
}

fn ideas_from_array(items: &[Value]) -> Vec<Idea> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match item {
            Value::Object(object) => Some(idea_from_object(index, object)),
            Value::String(s) if !s.trim().is_empty() => Some(Idea {
                id: positional_id(index),
                title: s.trim().to_string(),
                description: String::new(),
            }),
            _ => None,
        })
        .collect()
}

fn idea_from_object(index: usize, object: &Map<String, Value>) -> Idea {
    let id = first_text(object, &["id"])
        .and_then(IdeaId::new)
        .unwrap_or_else(|| positional_id(index));
    let description = first_text(object, DESCRIPTION_KEYS).unwrap_or_default();
    let title = first_text(object, TITLE_KEYS).unwrap_or_else(|| format!("Idea {}", index + 1));
    Idea {
        id,
        title,
        description,
    }
}

fn wrap_raw(text: &str) -> Idea {
    Idea {
        id: positional_id(0),
        title: "Generated ideas".to_string(),
        description: text.trim().to_string(),
    }
}

fn positional_id(index: usize) -> IdeaId {
    IdeaId::from_trusted(format!("idea-{}", index + 1))
}

// Models occasionally repeat ids; selection needs them unique.
fn dedupe_ids(ideas: Vec<Idea>) -> Vec<Idea> {
    let mut seen = HashSet::new();
    ideas
        .into_iter()
        .enumerate()
        .map(|(index, mut idea)| {
            if !seen.contains(&idea.id) {
                seen.insert(idea.id.clone());
                return idea;
            }
            let mut suffix = index + 1;
            let mut candidate = IdeaId::from_trusted(format!("{}-{suffix}", idea.id));
            while seen.contains(&candidate) {
                suffix += 1;
                candidate = IdeaId::from_trusted(format!("{}-{suffix}", idea.id));
            }
            seen.insert(candidate.clone());
            idea.id = candidate;
            idea
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Set of selected idea ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaSelection {
    selected: BTreeSet<IdeaId>,
}

impl IdeaSelection {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the selection of `id`. Returns `true` if it is now selected.
    pub fn toggle(&mut self, id: &IdeaId) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.clone());
            true
        }
    }

    /// Returns `true` if `id` is selected.
    pub fn is_selected(&self, id: &IdeaId) -> bool {
        self.selected.contains(id)
    }

    /// Number of selected ids.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Returns `true` when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Drops ids that no longer match any card.
    pub fn retain_known(&mut self, ideas: &[Idea]) {
        let known: HashSet<&IdeaId> = ideas.iter().map(|i| &i.id).collect();
        self.selected.retain(|id| known.contains(id));
    }

    /// Serialises the selected cards, in card order, as a JSON array.
    pub fn payload(&self, ideas: &[Idea]) -> String {
        let chosen: Vec<Value> = ideas
            .iter()
            .filter(|idea| self.is_selected(&idea.id))
            .map(|idea| {
                serde_json::json!({
                    "id": idea.id.as_str(),
                    "title": idea.title,
                    "description": idea.description,
                })
            })
            .collect();
        format!("{:#}", Value::Array(chosen))
    }
}
