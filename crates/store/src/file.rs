//! File-system run store: one JSON document per run.
//!
//! Layout: `<root>/<tenant>/<run-id>.json`. Writes go to a temporary sibling
//! first and are renamed into place, so a crash never leaves a half-written
//! record behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use pipeline::{RunId, RunPatch, RunRecord, RunStore, RunSummary, StoreError, TenantId};

use crate::sort_most_recent_first;

/// Run store persisting pretty-printed JSON files under a root directory.
#[derive(Debug)]
pub struct FileRunStore {
    root: PathBuf,
    // Serialises read-modify-write cycles of `update`.
    write_lock: Mutex<()>,
}

impl FileRunStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        // Tenant ids come from configuration or auth; keep them to one path segment.
        let segment: String = tenant
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(segment)
    }

    fn run_path(&self, tenant: &TenantId, id: RunId) -> PathBuf {
        self.tenant_dir(tenant).join(format!("{id}.json"))
    }

    async fn read(&self, tenant: &TenantId, id: RunId) -> Result<RunRecord, StoreError> {
        let path = self.run_path(tenant, id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound { id }),
            Err(e) => return Err(io_error(&path, e)),
        };
        let record: RunRecord = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
            message: format!("{}: {e}", path.display()),
        })?;
        if &record.tenant != tenant {
            return Err(StoreError::NotFound { id });
        }
        Ok(record)
    }

    async fn write(&self, record: &RunRecord) -> Result<(), StoreError> {
        let dir = self.tenant_dir(&record.tenant);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let json = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
        let path = self.run_path(&record.tenant, record.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(())
    }
}

fn io_error(path: &Path, error: std::io::Error) -> StoreError {
    StoreError::Io {
        message: format!("{}: {error}", path.display()),
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn create(&self, tenant: &TenantId, title: &str) -> Result<RunRecord, StoreError> {
        let record = RunRecord::new(RunId::new_random(), tenant.clone(), title);
        let _guard = self.write_lock.lock().await;
        self.write(&record).await?;
        debug!(run_id = %record.id, "Created run file");
        Ok(record)
    }

    #[instrument(skip(self, patch), fields(root = %self.root.display()))]
    async fn update(&self, tenant: &TenantId, id: RunId, patch: &RunPatch) -> Result<RunRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read(tenant, id).await?;
        record.apply(patch);
        self.write(&record).await?;
        Ok(record)
    }

    async fn select(&self, tenant: &TenantId, id: RunId) -> Result<RunRecord, StoreError> {
        self.read(tenant, id).await
    }

    async fn list(&self, tenant: &TenantId) -> Result<Vec<RunSummary>, StoreError> {
        let dir = self.tenant_dir(tenant);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<RunId>().ok())
            else {
                continue;
            };
            match self.read(tenant, id).await {
                Ok(record) => summaries.push(record.summary()),
                // One unreadable file must not hide the rest of the picker.
                Err(error) => warn!(path = %path.display(), error = %error, "Skipping unreadable run file"),
            }
        }
        sort_most_recent_first(&mut summaries);
        Ok(summaries)
    }
}
