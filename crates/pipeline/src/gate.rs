//! Touchpoint gate: the per-stage state machine.
//!
//! ```text
//! pending ──start──▶ running ──finish──▶ editing   (touchpoint)
//!                       │    └─finish──▶ completed (no touchpoint)
//!                       └──fail──▶ pending
//! editing ──edit──▶ editing
//! editing ──approve──▶ approved
//! editing ──regenerate──▶ running
//! completed ──regenerate──▶ running
//! ```
//!
//! `approved` and `completed` both unlock the next stage.

use serde::{Deserialize, Serialize};

use crate::{GateError, StageId};

/// Where a single stage stands within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not started.
    Pending,
    /// A completion call is in flight.
    Running,
    /// Finished without a touchpoint; the run moves on by itself.
    Completed,
    /// Finished and waiting for the user to review, edit or approve.
    Editing,
    /// Explicitly approved. Terminal for this stage.
    Approved,
}

impl StageState {
    /// Returns `true` once the next stage may start.
    pub fn unlocks_next(self) -> bool {
        matches!(self, StageState::Approved | StageState::Completed)
    }

    /// Returns `true` while the stage holds output the user can act on.
    pub fn awaits_review(self) -> bool {
        matches!(self, StageState::Editing)
    }

    fn as_str(self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Completed => "completed",
            StageState::Editing => "editing",
            StageState::Approved => "approved",
        }
    }

    /// Applies `event` to this state.
    ///
    /// `touchpoint` decides where a finished run lands.
    ///
    /// # Errors
    ///
    /// [`GateError`] for any pair not listed in the module diagram.
    pub fn apply(
        self,
        stage: StageId,
        event: GateEvent,
        touchpoint: bool,
    ) -> Result<StageState, GateError> {
        use GateEvent as E;
        use StageState as S;

        match (self, event) {
            (S::Pending, E::Start) => Ok(S::Running),
            (S::Running, E::Finish) if touchpoint => Ok(S::Editing),
            (S::Running, E::Finish) => Ok(S::Completed),
            (S::Running, E::Fail) => Ok(S::Pending),
            (S::Editing, E::Edit) => Ok(S::Editing),
            (S::Editing, E::Approve) => Ok(S::Approved),
            (S::Editing | S::Completed, E::Regenerate) => Ok(S::Running),
            (state, event) => Err(GateError {
                stage,
                state,
                action: event.as_str(),
            }),
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User or runner action applied to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// The runner begins the stage.
    Start,
    /// The runner produced output.
    Finish,
    /// The runner failed and the stage did not advance.
    Fail,
    /// The user overrode the output text.
    Edit,
    /// The user approved the output.
    Approve,
    /// The user asked for a fresh output from the same context.
    Regenerate,
}

impl GateEvent {
    fn as_str(self) -> &'static str {
        match self {
            GateEvent::Start => "start",
            GateEvent::Finish => "finish",
            GateEvent::Fail => "fail",
            GateEvent::Edit => "edit",
            GateEvent::Approve => "approve",
            GateEvent::Regenerate => "regenerate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGE: StageId = StageId::Ideation;

    #[test]
    fn test_touchpoint_stage_waits_for_approval() {
        let state = StageState::Pending
            .apply(STAGE, GateEvent::Start, true)
            .and_then(|s| s.apply(STAGE, GateEvent::Finish, true))
            .unwrap();
        assert_eq!(state, StageState::Editing);
        assert!(!state.unlocks_next());

        let approved = state.apply(STAGE, GateEvent::Approve, true).unwrap();
        assert!(approved.unlocks_next());
    }

    #[test]
    fn test_plain_stage_completes_without_editing() {
        let state = StageState::Running
            .apply(STAGE, GateEvent::Finish, false)
            .unwrap();
        assert_eq!(state, StageState::Completed);
        assert!(state.unlocks_next());
        assert!(state.apply(STAGE, GateEvent::Edit, false).is_err());
    }

    #[test]
    fn test_regenerate_returns_to_running() {
        assert_eq!(
            StageState::Editing.apply(STAGE, GateEvent::Regenerate, true),
            Ok(StageState::Running)
        );
        assert_eq!(
            StageState::Completed.apply(STAGE, GateEvent::Regenerate, false),
            Ok(StageState::Running)
        );
    }

    #[test]
    fn test_approved_is_terminal() {
        for event in [
            GateEvent::Start,
            GateEvent::Edit,
            GateEvent::Approve,
            GateEvent::Regenerate,
        ] {
            assert!(StageState::Approved.apply(STAGE, event, true).is_err());
        }
    }

    #[test]
    fn test_cannot_approve_before_running() {
        let err = StageState::Pending
            .apply(STAGE, GateEvent::Approve, true)
            .unwrap_err();
        assert_eq!(err.action, "approve");
        assert_eq!(err.state, StageState::Pending);
    }

    #[test]
    fn test_failure_resets_to_pending() {
        assert_eq!(
            StageState::Running.apply(STAGE, GateEvent::Fail, true),
            Ok(StageState::Pending)
        );
    }
}
