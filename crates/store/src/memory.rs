//! In-memory run store for tests, demos and single-process use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use pipeline::{RunId, RunPatch, RunRecord, RunStore, RunSummary, StoreError, TenantId};

use crate::sort_most_recent_first;

/// Run store backed by a shared `HashMap`.
///
/// Cloning yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryRunStore {
    runs: Arc<RwLock<HashMap<RunId, RunRecord>>>,
}

impl MemoryRunStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs across all tenants.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, tenant: &TenantId, title: &str) -> Result<RunRecord, StoreError> {
        let record = RunRecord::new(RunId::new_random(), tenant.clone(), title);
        self.runs.write().await.insert(record.id, record.clone());
        debug!(run_id = %record.id, tenant = %tenant, "Created run");
        Ok(record)
    }

    async fn update(&self, tenant: &TenantId, id: RunId, patch: &RunPatch) -> Result<RunRecord, StoreError> {
        let mut runs = self.runs.write().await;
        let record = runs
            .get_mut(&id)
            .filter(|r| &r.tenant == tenant)
            .ok_or(StoreError::NotFound { id })?;
        record.apply(patch);
        Ok(record.clone())
    }

    async fn select(&self, tenant: &TenantId, id: RunId) -> Result<RunRecord, StoreError> {
        self.runs
            .read()
            .await
            .get(&id)
            .filter(|r| &r.tenant == tenant)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn list(&self, tenant: &TenantId) -> Result<Vec<RunSummary>, StoreError> {
        let mut summaries: Vec<RunSummary> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| &r.tenant == tenant)
            .map(RunRecord::summary)
            .collect();
        sort_most_recent_first(&mut summaries);
        Ok(summaries)
    }
}
