//! The static Stage Catalog and the status → stage lookup table.
//!
//! The catalog is the single source of truth for stage order. Persisted runs
//! only record a [`RunStatus`]; everything else about where a run stands is
//! derived from the catalog via [`StageCatalog::index_for_status`], so the two
//! can never drift apart.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{CatalogError, ModelId};

// ---------------------------------------------------------------------------
// Stage identifiers
// ---------------------------------------------------------------------------

/// One of the five content-pipeline stages.
///
/// Older records used `upload`, `structure` and `script` for three of these;
/// the aliases are accepted when parsing and deserialising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Analysis of the uploaded performance report.
    #[serde(alias = "upload")]
    Analysis,
    /// Generation of candidate content ideas.
    Ideation,
    /// Research on the selected ideas.
    Research,
    /// Narrative structure of the piece, as ordered blocks.
    #[serde(alias = "structure")]
    Narrative,
    /// Final script writing.
    #[serde(alias = "script")]
    Writing,
}

impl StageId {
    /// All stage ids in canonical pipeline order.
    pub const ALL: [StageId; 5] = [
        StageId::Analysis,
        StageId::Ideation,
        StageId::Research,
        StageId::Narrative,
        StageId::Writing,
    ];

    /// Returns the canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Analysis => "analysis",
            StageId::Ideation => "ideation",
            StageId::Research => "research",
            StageId::Narrative => "narrative",
            StageId::Writing => "writing",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" | "upload" => Ok(StageId::Analysis),
            "ideation" => Ok(StageId::Ideation),
            "research" => Ok(StageId::Research),
            "narrative" | "structure" => Ok(StageId::Narrative),
            "writing" | "script" => Ok(StageId::Writing),
            other => Err(CatalogError::UnknownStage {
                name: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Persisted progress marker of a run.
///
/// Always one of the catalog's stage ids, the initial `pending` marker, or the
/// terminal `completed` marker. A stage status names the furthest stage whose
/// output has been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// Allocated but no stage output persisted yet.
    Pending,
    /// The named stage holds the furthest persisted output.
    Stage(StageId),
    /// The final stage has been approved.
    Completed,
}

impl RunStatus {
    /// Returns the persisted string form.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Stage(id) => id.as_str(),
            RunStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "completed" => Ok(RunStatus::Completed),
            other => other
                .parse::<StageId>()
                .map(RunStatus::Stage)
                .map_err(|_| CatalogError::UnknownStatus {
                    status: other.to_string(),
                }),
        }
    }
}

impl Serialize for RunStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Stage definitions
// ---------------------------------------------------------------------------

/// Static description of one stage. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stage identifier.
    pub id: StageId,
    /// Human-readable name shown in listings.
    pub display_name: String,
    /// Whether the run halts for explicit approval after this stage.
    pub touchpoint: bool,
    /// Model requested from the completion provider for this stage.
    pub preferred_model: ModelId,
}

impl StageDefinition {
    /// Creates a stage definition.
    pub fn new(
        id: StageId,
        display_name: impl Into<String>,
        touchpoint: bool,
        preferred_model: ModelId,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            touchpoint,
            preferred_model,
        }
    }
}

/// Ordered, validated list of stages.
///
/// The ordinal position of a stage is its index in this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCatalog {
    stages: Vec<StageDefinition>,
}

impl StageCatalog {
    /// Builds a catalog from an ordered list of definitions.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Empty`] if `stages` is empty and
    /// [`CatalogError::DuplicateStage`] if a stage id appears twice.
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self, CatalogError> {
        if stages.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.id) {
                return Err(CatalogError::DuplicateStage { stage: stage.id });
            }
        }
        Ok(Self { stages })
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always `false`; an empty catalog cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates over the stages in order.
    pub fn iter(&self) -> impl Iterator<Item = &StageDefinition> {
        self.stages.iter()
    }

    /// Looks up a stage by id.
    pub fn get(&self, id: StageId) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Ordinal position of a stage, if it is part of this catalog.
    pub fn position(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }

    /// Stage at a given ordinal position.
    pub fn at(&self, index: usize) -> Option<&StageDefinition> {
        self.stages.get(index)
    }

    /// The only stage without a predecessor.
    pub fn first(&self) -> &StageDefinition {
        &self.stages[0]
    }

    /// The stage following `id`, or `None` for the last stage.
    pub fn next(&self, id: StageId) -> Option<&StageDefinition> {
        self.position(id).and_then(|i| self.stages.get(i + 1))
    }

    /// Replaces the preferred model of one stage. Unknown ids are ignored.
    pub fn with_model(mut self, id: StageId, model: ModelId) -> Self {
        if let Some(stage) = self.stages.iter_mut().find(|s| s.id == id) {
            stage.preferred_model = model;
        }
        self
    }

    /// The fixed status → stage index lookup table.
    ///
    /// `pending` maps to the first stage, a stage status to that stage's
    /// position, and `completed` to one past the last stage.
    ///
    /// # Errors
    ///
    /// [`CatalogError::UnknownStatus`] when the status names a stage that is
    /// not part of this catalog.
    pub fn index_for_status(&self, status: RunStatus) -> Result<usize, CatalogError> {
        match status {
            RunStatus::Pending => Ok(0),
            RunStatus::Completed => Ok(self.len()),
            RunStatus::Stage(id) => self.position(id).ok_or(CatalogError::UnknownStatus {
                status: id.as_str().to_string(),
            }),
        }
    }

    /// Inverse of [`Self::index_for_status`] for positions that hold output.
    pub fn status_for_index(&self, index: usize) -> RunStatus {
        match self.stages.get(index) {
            Some(stage) => RunStatus::Stage(stage.id),
            None => RunStatus::Completed,
        }
    }
}

impl Default for StageCatalog {
    /// The five-stage content pipeline. Research runs unattended; every other
    /// stage waits for approval.
    fn default() -> Self {
        let def = |id, name: &str, touchpoint, model: &str| {
            StageDefinition::new(id, name, touchpoint, ModelId::from_trusted(model))
        };
        Self {
            stages: vec![
                def(StageId::Analysis, "Analysis", true, "google/gemini-2.5-flash"),
                def(StageId::Ideation, "Ideation", true, "anthropic/claude-sonnet-4"),
                def(StageId::Research, "Research", false, "perplexity/sonar"),
                def(StageId::Narrative, "Narrative", true, "anthropic/claude-sonnet-4"),
                def(StageId::Writing, "Writing", true, "openai/gpt-4o"),
            ],
        }
    }
}
