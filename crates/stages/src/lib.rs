//! ETER content pipeline orchestration.
//!
//! This crate provides the stage runner (prompt assembly, completion call,
//! model fallback, failure policy) and the [`PipelineService`] that drives a
//! run through the stage catalog, halting at touchpoints and persisting
//! progress after every step.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The service sequences calls between business logic
//! in the [`pipeline`] crate and the port traits (completion provider, run
//! store). It contains no domain rules of its own.

pub mod demo;
pub mod prompts;
mod report;
mod runner;
mod service;

pub use report::{Notice, StepReport};
pub use runner::{FailurePolicy, RunnerOutput, StageRunner};
pub use service::{PipelineService, RunHandle};
