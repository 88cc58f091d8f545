//! Pipeline service: sequences stage runs, touchpoint approvals and
//! persistence for one run at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use pipeline::{
    BrandIdentity, CompletionProvider, IdeaId, PipelineError, RunId, RunState, RunStore,
    RunSummary, StageCatalog, StageState, StageTask, StoreError, TenantId,
};

use crate::{Notice, StageRunner, StepReport};

// ---------------------------------------------------------------------------
// Run handle
// ---------------------------------------------------------------------------

/// Shared handle to one run's in-memory state.
///
/// Carries a busy flag so a second mutating call on the same run fails fast
/// instead of queueing behind the in-flight completion call.
#[derive(Debug, Clone)]
pub struct RunHandle {
    state: Arc<Mutex<RunState>>,
    busy: Arc<AtomicBool>,
}

impl RunHandle {
    /// Wraps a run state.
    pub fn new(state: RunState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Copy of the current state, for rendering.
    pub async fn snapshot(&self) -> RunState {
        self.state.lock().await.clone()
    }

    /// `true` while an operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Result<BusyGuard, PipelineError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        Ok(BusyGuard {
            flag: Arc::clone(&self.busy),
        })
    }
}

struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Orchestrates the stage catalog over a provider and a store.
#[derive(Debug)]
pub struct PipelineService<P, S> {
    catalog: StageCatalog,
    runner: StageRunner<P>,
    store: S,
    brand: Option<BrandIdentity>,
}

impl<P: CompletionProvider, S: RunStore> PipelineService<P, S> {
    /// Creates a service.
    pub fn new(catalog: StageCatalog, runner: StageRunner<P>, store: S) -> Self {
        Self {
            catalog,
            runner,
            store,
            brand: None,
        }
    }

    /// Supplies a brand identity as extra prompt context for every stage.
    pub fn with_brand(mut self, brand: BrandIdentity) -> Self {
        self.brand = Some(brand);
        self
    }

    /// The stage catalog in use.
    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Runs the first stage with `source` as context and persists the new run.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] for a blank title; under the strict
    /// policy, [`PipelineError::Provider`] with no run created.
    #[instrument(skip(self, source), fields(tenant = %tenant, source_len = source.len()))]
    pub async fn start(
        &self,
        tenant: TenantId,
        title: &str,
        source: &str,
    ) -> Result<(RunHandle, StepReport), PipelineError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PipelineError::Validation {
                message: "A run needs a title".to_string(),
            });
        }

        let mut state = RunState::new(&self.catalog, tenant, title, source);
        let mut notices = Vec::new();
        self.run_until_gate(&mut state, &mut notices).await?;
        self.persist(&mut state, &mut notices).await;
        info!(run_id = ?state.id(), status = %state.status(), "Run started");

        let report = report(&self.catalog, &state, notices);
        Ok((RunHandle::new(state), report))
    }

    /// Loads a persisted run for resuming.
    #[instrument(skip(self), fields(tenant = %tenant, run_id = %id))]
    pub async fn resume(&self, tenant: &TenantId, id: RunId) -> Result<RunHandle, PipelineError> {
        let record = self.store.select(tenant, id).await?;
        let state = RunState::resume(&self.catalog, record)?;
        debug!(status = %state.status(), current = state.current_stage(), "Run resumed");
        Ok(RunHandle::new(state))
    }

    /// Lists the tenant's runs, most recently updated first.
    pub async fn list(&self, tenant: &TenantId) -> Result<Vec<RunSummary>, PipelineError> {
        Ok(self.store.list(tenant).await?)
    }

    /// Approves the stage under review and runs forward to the next touchpoint.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Busy`], [`PipelineError::Validation`] (no network
    /// call made), a gate error, or under the strict policy
    /// [`PipelineError::Provider`] after the progress made so far is saved.
    #[instrument(skip(self, handle))]
    pub async fn approve(&self, handle: &RunHandle) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();

        let outcome = match state.approve(&self.catalog)? {
            Some(_) => self.run_until_gate(&mut state, &mut notices).await,
            None => {
                info!(run_id = ?state.id(), "Run completed");
                Ok(())
            }
        };
        self.persist(&mut state, &mut notices).await;
        outcome?;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Replaces the output text of the stage under review.
    #[instrument(skip(self, handle, content), fields(content_len = content.len()))]
    pub async fn edit(&self, handle: &RunHandle, content: &str) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();
        state.edit(&self.catalog, content)?;
        self.persist(&mut state, &mut notices).await;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Discards the current stage's output and runs it again with the same context.
    #[instrument(skip(self, handle))]
    pub async fn regenerate(&self, handle: &RunHandle) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();

        let task = state.begin_regenerate(&self.catalog)?;
        let outcome = match self.execute(&mut state, task, &mut notices).await {
            Ok(StageState::Completed) => match state.approve(&self.catalog) {
                Ok(Some(_)) => self.run_until_gate(&mut state, &mut notices).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        self.persist(&mut state, &mut notices).await;
        outcome?;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Runs the current stage again after a strict-policy failure left it pending.
    #[instrument(skip(self, handle))]
    pub async fn retry(&self, handle: &RunHandle) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();
        let outcome = self.run_until_gate(&mut state, &mut notices).await;
        self.persist(&mut state, &mut notices).await;
        outcome?;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Toggles an idea card during ideation review. Returns whether it is now selected.
    pub async fn toggle_idea(&self, handle: &RunHandle, id: &IdeaId) -> Result<bool, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        state.toggle_idea(&self.catalog, id)
    }

    /// Moves one narrative block (drag reorder).
    pub async fn move_block(
        &self,
        handle: &RunHandle,
        from: usize,
        to: usize,
    ) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();
        state.move_block(&self.catalog, from, to)?;
        self.persist(&mut state, &mut notices).await;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Applies a complete new block order.
    pub async fn reorder_blocks(&self, handle: &RunHandle, order: &[usize]) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();
        state.reorder_blocks(&self.catalog, order)?;
        self.persist(&mut state, &mut notices).await;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Edits the text of one narrative block.
    pub async fn edit_block(
        &self,
        handle: &RunHandle,
        index: usize,
        content: &str,
    ) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        let mut notices = Vec::new();
        state.edit_block(&self.catalog, index, content)?;
        self.persist(&mut state, &mut notices).await;
        Ok(report(&self.catalog, &state, notices))
    }

    /// Retries persisting in-memory progress without re-running any stage.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Store`] if the store still rejects the write.
    #[instrument(skip(self, handle))]
    pub async fn save(&self, handle: &RunHandle) -> Result<StepReport, PipelineError> {
        let _busy = handle.try_begin()?;
        let mut state = handle.state.lock().await;
        self.save_state(&mut state).await?;
        state.set_dirty(false);
        Ok(report(&self.catalog, &state, Vec::new()))
    }

    // -- internals ----------------------------------------------------------

    // Runs the current pending stage, then keeps going while stages complete
    // without a touchpoint.
    async fn run_until_gate(&self, state: &mut RunState, notices: &mut Vec<Notice>) -> Result<(), PipelineError> {
        loop {
            let task = state.begin(&self.catalog)?;
            let landed = self.execute(state, task, notices).await?;
            if landed != StageState::Completed {
                return Ok(());
            }
            debug!("Stage has no touchpoint; advancing");
            if state.approve(&self.catalog)?.is_none() {
                return Ok(());
            }
        }
    }

    async fn execute(
        &self,
        state: &mut RunState,
        task: StageTask,
        notices: &mut Vec<Notice>,
    ) -> Result<StageState, PipelineError> {
        let stage = task.stage.id;
        match self.runner.run(&task.stage, &task.context, self.brand.as_ref()).await {
            Ok(out) => {
                notices.extend(out.notices);
                state.finish(&self.catalog, stage, out.output)
            }
            Err(source) => {
                state.fail(&self.catalog, stage)?;
                Err(PipelineError::Provider { stage, source })
            }
        }
    }

    async fn persist(&self, state: &mut RunState, notices: &mut Vec<Notice>) {
        match self.save_state(state).await {
            Ok(()) => state.set_dirty(false),
            Err(error) => {
                warn!(error = %error, run_id = ?state.id(), "Failed to persist run; progress kept in memory");
                state.set_dirty(true);
                notices.push(Notice::SaveFailed {
                    message: error.to_string(),
                });
            }
        }
    }

    async fn save_state(&self, state: &mut RunState) -> Result<(), StoreError> {
        let id = match state.id() {
            Some(id) => id,
            None => {
                let record = self.store.create(state.tenant(), state.title()).await?;
                state.set_id(record.id);
                record.id
            }
        };
        self.store
            .update(state.tenant(), id, &state.to_patch(&self.catalog))
            .await?;
        Ok(())
    }
}

fn report(catalog: &StageCatalog, state: &RunState, notices: Vec<Notice>) -> StepReport {
    let stage = state.current_definition(catalog).map(|s| s.id);
    StepReport {
        run_id: state.id(),
        status: state.status(),
        current_stage: state.current_stage(),
        stage,
        stage_state: stage.and_then(|s| state.stage_state(catalog, s)),
        notices,
    }
}
