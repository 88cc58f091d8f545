//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive, so a [`TenantId`] can never be handed to something
//! expecting a [`ModelId`] even though both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or whitespace only.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wraps a value the caller has already checked to be non-empty.
            #[allow(dead_code)]
            pub(crate) fn from_trusted(value: impl Into<String>) -> Self {
                Self(value.into())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one end-to-end content production attempt (a "campaign").
///
/// Allocated by the [`crate::RunStore`] when the run is first persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies the user or workspace that owns a set of runs.
    ///
    /// Every store operation is scoped to a tenant; runs belonging to another
    /// tenant are invisible.
    TenantId
}

string_id! {
    /// A completion-provider model identifier (e.g. `"google/gemini-2.5-flash"`).
    ModelId
}

string_id! {
    /// Identifies one idea card produced by the ideation stage.
    ///
    /// Taken from the model's `id` field when present, otherwise synthesised
    /// from the card's position (`idea-1`, `idea-2`, ...).
    IdeaId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_ids_reject_blank_values() {
        assert!(TenantId::new("").is_none());
        assert!(ModelId::new("   ").is_none());
        assert_eq!(IdeaId::new("idea-1").map(|i| i.to_string()), Some("idea-1".to_string()));
    }

    #[test]
    fn test_run_id_parses_its_display_form() {
        let id = RunId::new_random();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<RunId>().is_err());
    }

    #[test]
    fn test_string_ids_serialise_transparently() {
        let model = ModelId::new("openai/gpt-4o-mini").unwrap();
        assert_eq!(serde_json::to_string(&model).unwrap(), "\"openai/gpt-4o-mini\"");
    }
}
