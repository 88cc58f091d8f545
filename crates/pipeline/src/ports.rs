//! Port traits implemented by infrastructure crates.
//!
//! The orchestration layer depends only on these traits; `llm`, `store` and
//! `ingest` supply the implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    IngestError, ModelId, ProviderError, RunId, RunPatch, RunRecord, RunSummary, StoreError,
    TenantId,
};

// ---------------------------------------------------------------------------
// Completion provider
// ---------------------------------------------------------------------------

/// A single-turn chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to ask for.
    pub model: ModelId,
    /// System prompt (the stage template).
    pub system: String,
    /// User message (context plus brand section).
    pub user: String,
}

/// A completion returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text or markdown.
    pub text: String,
    /// Model that actually answered. Routers may substitute another model.
    pub model: ModelId,
}

/// A chat-completion service (OpenRouter, an AI gateway, or a test double).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Requests one assistant turn.
    ///
    /// # Errors
    ///
    /// [`ProviderError`] for transport, status, timeout, credential and
    /// response-shape failures.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

// ---------------------------------------------------------------------------
// Run store
// ---------------------------------------------------------------------------

/// Persistence collaborator for pipeline runs.
///
/// Every call is scoped to a tenant; a run is invisible to other tenants.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Allocates a new `pending` run.
    async fn create(&self, tenant: &TenantId, title: &str) -> Result<RunRecord, StoreError>;

    /// Merges `patch` into the run. Safe to repeat with the same patch.
    async fn update(&self, tenant: &TenantId, id: RunId, patch: &RunPatch) -> Result<RunRecord, StoreError>;

    /// Loads one run.
    async fn select(&self, tenant: &TenantId, id: RunId) -> Result<RunRecord, StoreError>;

    /// Lists the tenant's runs, most recently updated first.
    async fn list(&self, tenant: &TenantId) -> Result<Vec<RunSummary>, StoreError>;
}

// ---------------------------------------------------------------------------
// Document ingestion
// ---------------------------------------------------------------------------

/// External service that turns an uploaded document into an initial analysis.
#[async_trait]
pub trait DocumentIngestor: Send + Sync {
    /// Uploads `bytes` and returns the analysis text used as first-stage context.
    async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<String, IngestError>;
}
