//! The pipeline run aggregate.
//!
//! [`RunRecord`] is what the store persists. [`RunState`] is the in-memory
//! aggregate the service mutates: it owns the per-stage gate states, the idea
//! selection and the block board, and it knows which stage is current. All
//! transitions here are pure; I/O is sequenced by the orchestration layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    BlockBoard, CatalogError, GateEvent, Idea, IdeaId, IdeaSelection, PipelineError, RunId,
    RunStatus, StageCatalog, StageDefinition, StageId, StageOutput, StageState, TenantId,
    Timestamp, parse_ideas,
};

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// Persisted form of a pipeline run (a "campaign" or "playbook").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier.
    pub id: RunId,
    /// Owning tenant.
    pub tenant: TenantId,
    /// User-facing title.
    pub title: String,
    /// Furthest stage whose output has been persisted.
    pub status: RunStatus,
    /// Catalog index matching `status`.
    #[serde(default)]
    pub current_stage: usize,
    /// At most one output per stage.
    #[serde(default)]
    pub outputs: BTreeMap<StageId, StageOutput>,
    /// Stage approved into but not yet generated, set when its run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingStage>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl RunRecord {
    /// A fresh `pending` record.
    pub fn new(id: RunId, tenant: TenantId, title: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            tenant,
            title: title.into(),
            status: RunStatus::Pending,
            current_stage: 0,
            outputs: BTreeMap::new(),
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges a patch into the record.
    ///
    /// Outputs are overwritten per stage, never appended, so applying the same
    /// patch twice yields the same record (apart from `updated_at`).
    pub fn apply(&mut self, patch: &RunPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(current_stage) = patch.current_stage {
            self.current_stage = current_stage;
        }
        for (stage, output) in &patch.outputs {
            self.outputs.insert(*stage, output.clone());
        }
        self.pending = patch.pending.clone();
        self.updated_at = Timestamp::now();
    }

    /// Listing view of this record.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            title: self.title.clone(),
            status: self.status,
            current_stage: self.current_stage,
            updated_at: self.updated_at,
        }
    }
}

/// Partial update merged into a [`RunRecord`] by [`crate::RunStore::update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    /// New current stage index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<usize>,
    /// Outputs to overwrite, per stage.
    #[serde(default)]
    pub outputs: BTreeMap<StageId, StageOutput>,
    /// Replaces the stored pending marker; `None` clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingStage>,
}

/// Stage the run was approved into whose generation has not succeeded yet.
///
/// Status only names stages holding output, so without this marker a resumed
/// run would land back on the approved stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStage {
    /// Stage waiting to run.
    pub stage: StageId,
    /// Context it will be run with.
    pub context: String,
}

/// Entry of the resume picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier.
    pub id: RunId,
    /// User-facing title.
    pub title: String,
    /// Persisted status.
    pub status: RunStatus,
    /// Catalog index matching `status`.
    pub current_stage: usize,
    /// Last update time; listings sort on this, newest first.
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// In-memory aggregate
// ---------------------------------------------------------------------------

/// Stage about to be run, handed to the stage runner.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTask {
    /// Definition of the stage.
    pub stage: StageDefinition,
    /// Context the stage is run with.
    pub context: String,
}

/// In-memory state of one run.
#[derive(Debug, Clone)]
pub struct RunState {
    id: Option<RunId>,
    tenant: TenantId,
    title: String,
    status: RunStatus,
    current: usize,
    gates: Vec<StageState>,
    outputs: BTreeMap<StageId, StageOutput>,
    pending_context: String,
    ideas: Vec<Idea>,
    selection: IdeaSelection,
    board: BlockBoard,
    discarded: Option<Discarded>,
    dirty: bool,
}

// Output set aside by a regenerate, restored if the new run fails.
#[derive(Debug, Clone)]
struct Discarded {
    stage: StageId,
    output: StageOutput,
    selection: IdeaSelection,
}

impl RunState {
    /// A new, not yet persisted run whose first stage will receive `context`.
    pub fn new(
        catalog: &StageCatalog,
        tenant: TenantId,
        title: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            tenant,
            title: title.into(),
            status: RunStatus::Pending,
            current: 0,
            gates: vec![StageState::Pending; catalog.len()],
            outputs: BTreeMap::new(),
            pending_context: context.into(),
            ideas: Vec::new(),
            selection: IdeaSelection::new(),
            board: BlockBoard::default(),
            discarded: None,
            dirty: false,
        }
    }

    /// Rebuilds state from a persisted record, using its `status` and
    /// pending marker.
    ///
    /// Stages before the status position are approved, the stage at the
    /// position awaits review, later stages are pending. A pending marker
    /// naming the next stage means the status stage was already approved and
    /// the run sits on that next stage, ready to be retried.
    ///
    /// # Errors
    ///
    /// [`CatalogError::UnknownStatus`] when the status is not in `catalog`.
    pub fn resume(catalog: &StageCatalog, record: RunRecord) -> Result<Self, CatalogError> {
        let current = catalog.index_for_status(record.status)?;
        if record.current_stage != current {
            warn!(
                run_id = %record.id,
                stored = record.current_stage,
                derived = current,
                "Stored current stage disagrees with status; using status"
            );
        }

        let mut gates = vec![StageState::Pending; catalog.len()];
        for (index, stage) in catalog.iter().enumerate() {
            gates[index] = if index < current {
                StageState::Approved
            } else if index == current && record.status != RunStatus::Pending {
                match record.outputs.get(&stage.id) {
                    Some(_) if stage.touchpoint => StageState::Editing,
                    Some(_) => StageState::Completed,
                    None => {
                        warn!(run_id = %record.id, stage = %stage.id, "Status names a stage without output");
                        StageState::Pending
                    }
                }
            } else {
                StageState::Pending
            };
        }

        let mut current = current;
        let mut pending_context = String::new();
        if let Some(pending) = record.pending {
            let next = current + 1;
            match catalog.at(current) {
                Some(stage)
                    if record.status != RunStatus::Pending
                        && catalog.position(pending.stage) == Some(next)
                        && gates[current] != StageState::Pending =>
                {
                    gates[current] = if stage.touchpoint {
                        StageState::Approved
                    } else {
                        StageState::Completed
                    };
                    current = next;
                    pending_context = pending.context;
                }
                _ => warn!(
                    run_id = %record.id,
                    stage = %pending.stage,
                    "Pending stage does not follow the status; ignoring it"
                ),
            }
        }

        let mut state = Self {
            id: Some(record.id),
            tenant: record.tenant,
            title: record.title,
            status: record.status,
            current,
            gates,
            outputs: record.outputs,
            pending_context,
            ideas: Vec::new(),
            selection: IdeaSelection::new(),
            board: BlockBoard::default(),
            discarded: None,
            dirty: false,
        };
        if let Some(stage) = catalog.at(current) {
            state.refresh_views(stage.id);
        }
        Ok(state)
    }

    // -- accessors ----------------------------------------------------------

    /// Persisted id, once the run has been created in the store.
    pub fn id(&self) -> Option<RunId> {
        self.id
    }

    /// Records the id allocated by the store.
    pub fn set_id(&mut self, id: RunId) {
        self.id = Some(id);
    }

    /// Owning tenant.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// User-facing title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Current status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Index of the stage being worked on; equals the catalog length once completed.
    pub fn current_stage(&self) -> usize {
        self.current
    }

    /// Gate state of a stage.
    pub fn stage_state(&self, catalog: &StageCatalog, stage: StageId) -> Option<StageState> {
        catalog.position(stage).and_then(|i| self.gates.get(i).copied())
    }

    /// Output of a stage, if any.
    pub fn output(&self, stage: StageId) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }

    /// Idea cards parsed from the ideation output.
    pub fn ideas(&self) -> &[Idea] {
        &self.ideas
    }

    /// Selected idea ids.
    pub fn selection(&self) -> &IdeaSelection {
        &self.selection
    }

    /// Block board built from the narrative output.
    pub fn board(&self) -> &BlockBoard {
        &self.board
    }

    /// `true` while in-memory progress has not been persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks in-memory progress as (un)persisted.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// `true` once the last stage has been approved.
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Definition of the current stage, or `None` once completed.
    pub fn current_definition<'a>(&self, catalog: &'a StageCatalog) -> Option<&'a StageDefinition> {
        catalog.at(self.current)
    }

    /// Patch carrying the whole persisted view of this state.
    ///
    /// Sending everything keeps saves idempotent and lets a failed save be
    /// retried as-is.
    pub fn to_patch(&self, catalog: &StageCatalog) -> RunPatch {
        RunPatch {
            title: Some(self.title.clone()),
            status: Some(self.status),
            current_stage: catalog.index_for_status(self.status).ok(),
            outputs: self.outputs.clone(),
            pending: self.pending_stage(catalog),
        }
    }

    /// The current stage when it was approved into but has no output yet.
    pub fn pending_stage(&self, catalog: &StageCatalog) -> Option<PendingStage> {
        let stage = self.current_definition(catalog)?;
        let waiting = self.status != RunStatus::Pending
            && self.gates[self.current] == StageState::Pending
            && !self.outputs.contains_key(&stage.id);
        waiting.then(|| PendingStage {
            stage: stage.id,
            context: self.pending_context.clone(),
        })
    }

    // -- transitions --------------------------------------------------------

    /// Moves the current pending stage to `running`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::RunCompleted`] after the last approval, or a gate
    /// error if the current stage is not pending.
    pub fn begin(&mut self, catalog: &StageCatalog) -> Result<StageTask, PipelineError> {
        let stage = self.current_stage_def(catalog)?;
        self.transition(catalog, stage.id, GateEvent::Start)?;
        Ok(StageTask {
            context: self.pending_context.clone(),
            stage,
        })
    }

    /// Discards the current stage's output and moves it back to `running`.
    ///
    /// The returned task carries the context the discarded output was
    /// generated from. The output is set aside until the new run finishes and
    /// comes back if it fails.
    ///
    /// # Errors
    ///
    /// Gate error unless the current stage is `editing` or `completed`.
    pub fn begin_regenerate(&mut self, catalog: &StageCatalog) -> Result<StageTask, PipelineError> {
        let stage = self.current_stage_def(catalog)?;
        self.transition(catalog, stage.id, GateEvent::Regenerate)?;
        if let Some(previous) = self.outputs.remove(&stage.id) {
            self.pending_context = previous.context.clone();
            self.discarded = Some(Discarded {
                stage: stage.id,
                output: previous,
                selection: self.selection.clone(),
            });
        }
        self.clear_views(stage.id);
        Ok(StageTask {
            context: self.pending_context.clone(),
            stage,
        })
    }

    /// Stores the output of the running stage.
    ///
    /// Touchpoint stages land in `editing`, others in `completed`.
    pub fn finish(
        &mut self,
        catalog: &StageCatalog,
        stage: StageId,
        output: StageOutput,
    ) -> Result<StageState, PipelineError> {
        let next = self.transition(catalog, stage, GateEvent::Finish)?;
        self.discarded = None;
        self.outputs.insert(stage, output);
        self.advance_status(catalog, stage);
        self.refresh_views(stage);
        self.dirty = true;
        Ok(next)
    }

    /// Records a failed run of the stage; it returns to `pending`.
    ///
    /// A failed regenerate instead restores the output it discarded, so the
    /// stage is back under review exactly as before.
    pub fn fail(&mut self, catalog: &StageCatalog, stage: StageId) -> Result<StageState, PipelineError> {
        let mut state = self.transition(catalog, stage, GateEvent::Fail)?;
        let Some(discarded) = self.discarded.take_if(|d| d.stage == stage) else {
            return Ok(state);
        };
        if let Some(index) = catalog.position(stage) {
            let touchpoint = catalog.at(index).is_some_and(|s| s.touchpoint);
            state = if touchpoint { StageState::Editing } else { StageState::Completed };
            self.gates[index] = state;
        }
        self.outputs.insert(stage, discarded.output);
        self.refresh_views(stage);
        self.selection = discarded.selection;
        self.selection.retain_known(&self.ideas);
        Ok(state)
    }

    /// Overrides the current stage's output text.
    ///
    /// # Errors
    ///
    /// Gate error unless the current stage is awaiting review.
    pub fn edit(&mut self, catalog: &StageCatalog, content: impl Into<String>) -> Result<(), PipelineError> {
        let stage = self.current_stage_def(catalog)?;
        self.transition(catalog, stage.id, GateEvent::Edit)?;
        if let Some(output) = self.outputs.get_mut(&stage.id) {
            output.edit(content);
        }
        self.refresh_views(stage.id);
        self.dirty = true;
        Ok(())
    }

    /// Approves the current stage and moves to the next one.
    ///
    /// Returns the next stage's context, or `None` when the run completed.
    /// A `completed` (non-touchpoint) stage advances without a gate transition.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] when approving a gated ideation stage with
    /// no idea selected, or a gate error if the stage is not ready.
    pub fn approve(&mut self, catalog: &StageCatalog) -> Result<Option<String>, PipelineError> {
        let stage = self.current_stage_def(catalog)?;
        let state = self.gates[self.current];

        if state != StageState::Completed {
            if state == StageState::Editing && stage.id == StageId::Ideation && stage.touchpoint && self.selection.is_empty() {
                return Err(PipelineError::Validation {
                    message: "Select at least one idea before approving".to_string(),
                });
            }
            self.transition(catalog, stage.id, GateEvent::Approve)?;
        }

        let context = self.next_context(&stage);
        self.current += 1;
        if self.current >= catalog.len() {
            self.status = RunStatus::Completed;
            self.dirty = true;
            return Ok(None);
        }
        self.pending_context = context.clone();
        self.ideas.clear();
        self.selection = IdeaSelection::new();
        self.board = BlockBoard::default();
        Ok(Some(context))
    }

    /// Toggles an idea card on the ideation stage.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] when the ideation stage is not under
    /// review or no card has this id.
    pub fn toggle_idea(&mut self, catalog: &StageCatalog, id: &IdeaId) -> Result<bool, PipelineError> {
        self.require_review(catalog, StageId::Ideation)?;
        if !self.ideas.iter().any(|idea| &idea.id == id) {
            return Err(PipelineError::Validation {
                message: format!("No idea with id '{id}'"),
            });
        }
        Ok(self.selection.toggle(id))
    }

    /// Moves a block on the narrative board.
    pub fn move_block(&mut self, catalog: &StageCatalog, from: usize, to: usize) -> Result<(), PipelineError> {
        self.require_review(catalog, StageId::Narrative)?;
        self.board.move_block(from, to)?;
        self.sync_board();
        Ok(())
    }

    /// Edits one block on the narrative board.
    pub fn edit_block(
        &mut self,
        catalog: &StageCatalog,
        index: usize,
        content: impl Into<String>,
    ) -> Result<(), PipelineError> {
        self.require_review(catalog, StageId::Narrative)?;
        self.board.edit_block(index, content)?;
        self.sync_board();
        Ok(())
    }

    /// Applies a full new block order on the narrative board.
    pub fn reorder_blocks(&mut self, catalog: &StageCatalog, order: &[usize]) -> Result<(), PipelineError> {
        self.require_review(catalog, StageId::Narrative)?;
        self.board.reorder(order)?;
        self.sync_board();
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn current_stage_def(&self, catalog: &StageCatalog) -> Result<StageDefinition, PipelineError> {
        self.current_definition(catalog)
            .cloned()
            .ok_or(PipelineError::RunCompleted)
    }

    fn transition(
        &mut self,
        catalog: &StageCatalog,
        stage: StageId,
        event: GateEvent,
    ) -> Result<StageState, PipelineError> {
        let index = catalog.position(stage).ok_or_else(|| CatalogError::UnknownStage {
            name: stage.as_str().to_string(),
        })?;
        let touchpoint = catalog.at(index).is_some_and(|s| s.touchpoint);
        let next = self.gates[index].apply(stage, event, touchpoint)?;
        self.gates[index] = next;
        Ok(next)
    }

    fn require_review(&self, catalog: &StageCatalog, stage: StageId) -> Result<(), PipelineError> {
        let current = self.current_definition(catalog).map(|s| s.id);
        if current != Some(stage) || !self.gates[self.current].awaits_review() {
            return Err(PipelineError::Validation {
                message: format!("The {stage} stage is not awaiting review"),
            });
        }
        Ok(())
    }

    // Status only moves forward: it names the furthest stage holding output.
    fn advance_status(&mut self, catalog: &StageCatalog, stage: StageId) {
        let reached = catalog.position(stage).unwrap_or(0);
        let recorded = catalog.index_for_status(self.status).unwrap_or(0);
        if self.status == RunStatus::Pending || reached >= recorded {
            self.status = RunStatus::Stage(stage);
        }
    }

    fn next_context(&self, stage: &StageDefinition) -> String {
        let content = self
            .outputs
            .get(&stage.id)
            .map(|o| o.content.clone())
            .unwrap_or_default();
        match stage.id {
            StageId::Ideation if stage.touchpoint => self.selection.payload(&self.ideas),
            StageId::Narrative if !self.board.is_empty() => self.board.payload(),
            _ => content,
        }
    }

    fn refresh_views(&mut self, stage: StageId) {
        let Some(content) = self.outputs.get(&stage).map(|o| o.content.clone()) else {
            return;
        };
        match stage {
            StageId::Ideation => {
                self.ideas = parse_ideas(&content).into_vec();
                self.selection.retain_known(&self.ideas);
            }
            StageId::Narrative => self.board = BlockBoard::from_output(&content),
            _ => {}
        }
    }

    fn clear_views(&mut self, stage: StageId) {
        match stage {
            StageId::Ideation => {
                self.ideas.clear();
                self.selection = IdeaSelection::new();
            }
            StageId::Narrative => self.board = BlockBoard::default(),
            _ => {}
        }
    }

    fn sync_board(&mut self) {
        let payload = self.board.payload();
        if let Some(output) = self.outputs.get_mut(&StageId::Narrative) {
            output.edit(payload);
        }
        self.dirty = true;
    }
}
