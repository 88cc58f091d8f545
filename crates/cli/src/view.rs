//! Plain-text rendering of runs and reports. No pipeline logic lives here.

use std::fmt::Write as _;

use pipeline::{OutputOrigin, RunState, RunSummary, StageCatalog, StageId};
use stages::StepReport;

/// One line per run, newest first.
pub fn render_list(summaries: &[RunSummary]) -> String {
    if summaries.is_empty() {
        return "No runs yet.\n".to_string();
    }
    let mut out = String::new();
    for run in summaries {
        let _ = writeln!(out, "{}  {:<10}  {}  {}", run.id, run.status.as_str(), run.updated_at, run.title);
    }
    out
}

/// Outcome line plus any notices.
pub fn render_report(report: &StepReport) -> String {
    let mut out = String::new();
    match (report.stage, report.stage_state) {
        (Some(stage), Some(state)) => {
            let _ = writeln!(out, "Status: {} (stage {stage} is {state})", report.status);
        }
        _ => {
            let _ = writeln!(out, "Status: {}", report.status);
        }
    }
    if let Some(id) = report.run_id {
        let _ = writeln!(out, "Run: {id}");
    }
    for notice in &report.notices {
        let _ = writeln!(out, "Note: {notice}");
    }
    out
}

/// Stage overview and the current stage's output.
pub fn render_state(catalog: &StageCatalog, state: &RunState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", state.title(), state.status());
    for (index, stage) in catalog.iter().enumerate() {
        let marker = if index == state.current_stage() { ">" } else { " " };
        let gate = state
            .stage_state(catalog, stage.id)
            .map(|s| s.to_string())
            .unwrap_or_default();
        let origin = match state.output(stage.id).map(|o| o.origin) {
            Some(OutputOrigin::Fallback) => " (demo output)",
            Some(OutputOrigin::Edited) => " (edited)",
            _ => "",
        };
        let _ = writeln!(out, "{marker} {}. {:<10} {gate}{origin}", index + 1, stage.display_name);
    }

    let Some(current) = state.current_definition(catalog) else {
        out.push_str("\nRun completed.\n");
        return out;
    };
    let Some(output) = state.output(current.id) else {
        return out;
    };
    let _ = writeln!(out, "\n--- {} ---", current.display_name);
    match current.id {
        StageId::Ideation if !state.ideas().is_empty() => {
            for idea in state.ideas() {
                let mark = if state.selection().is_selected(&idea.id) { "x" } else { " " };
                let _ = writeln!(out, "[{mark}] {}: {}", idea.id, idea.title);
                if !idea.description.is_empty() {
                    let _ = writeln!(out, "      {}", idea.description);
                }
            }
        }
        StageId::Narrative if !state.board().is_empty() => {
            for (index, block) in state.board().blocks().iter().enumerate() {
                match &block.title {
                    Some(title) => {
                        let _ = writeln!(out, "{}. {title}: {}", index + 1, block.content);
                    }
                    None => {
                        let _ = writeln!(out, "{}. {}", index + 1, block.content);
                    }
                }
            }
        }
        _ => {
            let _ = writeln!(out, "{}", output.content);
        }
    }
    out
}
