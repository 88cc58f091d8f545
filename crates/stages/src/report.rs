//! Side-channel notices and per-call reports returned to the caller.

use serde::Serialize;

use pipeline::{ModelId, RunId, RunStatus, StageId, StageState};

/// Something the user should be told about that did not stop the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// The provider failed and the stage shows canned demo output.
    DemoOutput {
        /// Stage that fell back.
        stage: StageId,
        /// Provider failure that triggered the fallback.
        reason: String,
    },
    /// The preferred model failed and the fallback model answered.
    ModelFallback {
        /// Stage that was rerouted.
        stage: StageId,
        /// Model that was asked for first.
        requested: ModelId,
        /// Model that produced the output.
        used: ModelId,
        /// Failure of the preferred model.
        reason: String,
    },
    /// The store rejected the write. Progress is kept in memory; call save again.
    SaveFailed {
        /// Store failure text.
        message: String,
    },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::DemoOutput { stage, reason } => {
                write!(f, "{stage}: showing demo output ({reason})")
            }
            Notice::ModelFallback {
                stage,
                requested,
                used,
                reason,
            } => write!(f, "{stage}: {requested} failed ({reason}); used {used}"),
            Notice::SaveFailed { message } => write!(f, "progress not saved: {message}"),
        }
    }
}

/// Outcome of one service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Persisted id, once the store allocated one.
    pub run_id: Option<RunId>,
    /// Run status after the call.
    pub status: RunStatus,
    /// Index of the current stage.
    pub current_stage: usize,
    /// Current stage id, `None` once completed.
    pub stage: Option<StageId>,
    /// Gate state of the current stage.
    pub stage_state: Option<StageState>,
    /// Notices raised during the call.
    pub notices: Vec<Notice>,
}

impl StepReport {
    /// `true` if the call substituted demo output anywhere.
    pub fn used_demo_output(&self) -> bool {
        self.notices
            .iter()
            .any(|n| matches!(n, Notice::DemoOutput { .. }))
    }

    /// `true` if persisting the run failed.
    pub fn save_failed(&self) -> bool {
        self.notices
            .iter()
            .any(|n| matches!(n, Notice::SaveFailed { .. }))
    }
}
