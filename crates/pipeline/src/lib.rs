//! Core domain for the ETER content pipeline.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type and error type used by the five-stage content pipeline. Infrastructure
//! crates implement the port traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RunId`, `TenantId`, `ModelId`, `IdeaId`) |
//! | [`catalog`] | `StageId`, `StageDefinition`, `StageCatalog`, `RunStatus` lookup |
//! | [`gate`] | Touchpoint gate state machine |
//! | [`run`] | Persisted `RunRecord` and in-memory `RunState` aggregate |
//! | [`ideas`] / [`blocks`] | Tolerant parsers for ideation and structure output |
//! | [`ports`] | `CompletionProvider`, `RunStore`, `DocumentIngestor` |
//! | [`types`] | `StageOutput`, `BrandIdentity`, `Timestamp` |
//! | [`errors`] | Error and retry-policy types |

pub mod blocks;
pub mod catalog;
pub mod errors;
pub mod extract;
pub mod gate;
pub mod identifiers;
pub mod ideas;
pub mod ports;
pub mod run;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use blocks::{parse_blocks, Block, BlockBoard};
pub use catalog::{RunStatus, StageCatalog, StageDefinition, StageId};
pub use errors::{
    CatalogError, GateError, IngestError, PipelineError, ProviderError, RetryPolicy, StoreError,
};
pub use extract::{extract_json, Parsed};
pub use gate::{GateEvent, StageState};
pub use identifiers::{IdeaId, ModelId, RunId, TenantId};
pub use ideas::{parse_ideas, Idea, IdeaSelection};
pub use ports::{Completion, CompletionProvider, CompletionRequest, DocumentIngestor, RunStore};
pub use run::{PendingStage, RunPatch, RunRecord, RunState, RunSummary, StageTask};
pub use types::{BrandIdentity, OutputOrigin, StageOutput, Timestamp};
