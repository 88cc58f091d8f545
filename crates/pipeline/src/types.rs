//! Shared value types for the content pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values that flow through prompts and persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ModelId;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Stage output
// ---------------------------------------------------------------------------

/// Who produced the content of a [`StageOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrigin {
    /// Returned by the completion provider.
    Generated,
    /// Canned demo output substituted after a provider failure.
    Fallback,
    /// Overridden by the user at a touchpoint.
    Edited,
}

/// Text or JSON blob attached to a run at one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The output text. For stages that answer in JSON this is the raw JSON.
    pub content: String,

    /// Who produced `content`.
    pub origin: OutputOrigin,

    /// Model that actually produced the text. `None` for demo output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,

    /// Input context the stage was run with. Regeneration reuses it.
    #[serde(default)]
    pub context: String,

    /// When `content` was last replaced.
    pub produced_at: Timestamp,
}

impl StageOutput {
    /// Output returned by a completion provider.
    pub fn generated(content: impl Into<String>, model: ModelId, context: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: OutputOrigin::Generated,
            model: Some(model),
            context: context.into(),
            produced_at: Timestamp::now(),
        }
    }

    /// Demo output substituted after a failure.
    pub fn fallback(content: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: OutputOrigin::Fallback,
            model: None,
            context: context.into(),
            produced_at: Timestamp::now(),
        }
    }

    /// Replaces the content with a user edit. Model and context are kept.
    pub fn edit(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.origin = OutputOrigin::Edited;
        self.produced_at = Timestamp::now();
    }
}

// ---------------------------------------------------------------------------
// Brand identity
// ---------------------------------------------------------------------------

/// Optional brand voice supplied as extra prompt context.
///
/// Managed outside the pipeline; read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandIdentity {
    /// Brand name.
    pub name: String,
    /// Description of the tone of voice.
    pub tone_of_voice: String,
    /// Terms the content should use.
    pub key_terms: Vec<String>,
    /// Terms the content must not use.
    pub avoid_terms: Vec<String>,
    /// Beliefs and values statement.
    pub beliefs: String,
}

impl BrandIdentity {
    /// Renders the non-empty fields as a prompt section.
    ///
    /// Returns an empty string when every field is empty.
    pub fn prompt_section(&self) -> String {
        let mut lines = Vec::new();
        if !self.name.trim().is_empty() {
            lines.push(format!("Brand: {}", self.name.trim()));
        }
        if !self.tone_of_voice.trim().is_empty() {
            lines.push(format!("Tone of voice: {}", self.tone_of_voice.trim()));
        }
        if !self.key_terms.is_empty() {
            lines.push(format!("Key terms: {}", self.key_terms.join(", ")));
        }
        if !self.avoid_terms.is_empty() {
            lines.push(format!("Avoid: {}", self.avoid_terms.join(", ")));
        }
        if !self.beliefs.trim().is_empty() {
            lines.push(format!("Beliefs: {}", self.beliefs.trim()));
        }
        lines.join("\n")
    }
}
