//! End-to-end behaviour of the pipeline service over scripted collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use pipeline::{
    BrandIdentity, Completion, CompletionProvider, CompletionRequest, IdeaId, ModelId, OutputOrigin,
    PipelineError, ProviderError, RunId, RunPatch, RunRecord, RunStatus, RunStore, RunSummary,
    StageCatalog, StageDefinition, StageId, StageState, StoreError, TenantId,
};
use stages::{FailurePolicy, Notice, PipelineService, RunHandle, StageRunner};
use store::MemoryRunStore;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ProviderInner {
    replies: Mutex<HashMap<String, VecDeque<Result<String, ProviderError>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    hold: AtomicBool,
    release: Notify,
}

/// Answers from per-model queues; an empty queue answers "<model> output".
#[derive(Clone, Default)]
struct ScriptedProvider {
    inner: Arc<ProviderInner>,
}

impl ScriptedProvider {
    fn script(&self, model: &str, reply: Result<&str, ProviderError>) {
        self.inner
            .replies
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply.map(str::to_string));
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests().pop().unwrap()
    }

    fn hold_next(&self) {
        self.inner.hold.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.inner.release.notify_one();
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        if self.inner.hold.swap(false, Ordering::SeqCst) {
            self.inner.release.notified().await;
        }
        let scripted = self
            .inner
            .replies
            .lock()
            .unwrap()
            .get_mut(request.model.as_str())
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(text)) => Ok(Completion {
                text,
                model: request.model.clone(),
            }),
            Some(Err(error)) => Err(error),
            None => Ok(Completion {
                text: format!("{} output", request.model),
                model: request.model.clone(),
            }),
        }
    }
}

/// Memory store whose writes can be switched off.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryRunStore,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                message: "disk full".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for FlakyStore {
    async fn create(&self, tenant: &TenantId, title: &str) -> Result<RunRecord, StoreError> {
        self.check()?;
        self.inner.create(tenant, title).await
    }

    async fn update(&self, tenant: &TenantId, id: RunId, patch: &RunPatch) -> Result<RunRecord, StoreError> {
        self.check()?;
        self.inner.update(tenant, id, patch).await
    }

    async fn select(&self, tenant: &TenantId, id: RunId) -> Result<RunRecord, StoreError> {
        self.inner.select(tenant, id).await
    }

    async fn list(&self, tenant: &TenantId) -> Result<Vec<RunSummary>, StoreError> {
        self.inner.list(tenant).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

type Service = PipelineService<ScriptedProvider, FlakyStore>;

fn model(name: &str) -> ModelId {
    ModelId::new(name).unwrap()
}

fn tenant() -> TenantId {
    TenantId::new("studio").unwrap()
}

/// Default catalog with one distinct model per stage.
fn catalog() -> StageCatalog {
    StageId::ALL.iter().fold(StageCatalog::default(), |catalog, stage| {
        catalog.with_model(*stage, model(&format!("test/{stage}")))
    })
}

fn service_with(catalog: StageCatalog, policy: FailurePolicy) -> (Service, ScriptedProvider, FlakyStore) {
    let provider = ScriptedProvider::default();
    let store = FlakyStore::default();
    let runner = StageRunner::new(provider.clone(), policy);
    (PipelineService::new(catalog, runner, store.clone()), provider, store)
}

fn service(policy: FailurePolicy) -> (Service, ScriptedProvider, FlakyStore) {
    service_with(catalog(), policy)
}

async fn record(store: &FlakyStore, handle: &RunHandle) -> RunRecord {
    let id = handle.snapshot().await.id().unwrap();
    store.select(&tenant(), id).await.unwrap()
}

/// Starts a run and approves through analysis and ideation, stopping at narrative review.
async fn run_to_narrative(service: &Service) -> RunHandle {
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    service
        .toggle_idea(&handle, &IdeaId::new("idea-1").unwrap())
        .await
        .unwrap();
    service.approve(&handle).await.unwrap();
    handle
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_halts_at_first_touchpoint() {
    let (service, provider, store) = service(FailurePolicy::Fallback);
    let (handle, report) = service.start(tenant(), "Spring launch", "report").await.unwrap();

    assert_eq!(report.stage, Some(StageId::Analysis));
    assert_eq!(report.stage_state, Some(StageState::Editing));
    assert_eq!(report.status, RunStatus::Stage(StageId::Analysis));
    assert!(report.notices.is_empty());
    assert_eq!(provider.requests().len(), 1);
    assert!(provider.last_request().user.contains("report"));

    let saved = record(&store, &handle).await;
    assert_eq!(saved.status, RunStatus::Stage(StageId::Analysis));
    assert_eq!(saved.current_stage, 0);
    assert_eq!(saved.outputs[&StageId::Analysis].content, "test/analysis output");
}

#[tokio::test]
async fn test_blank_title_is_rejected_before_any_call() {
    let (service, provider, _) = service(FailurePolicy::Fallback);
    let err = service.start(tenant(), "  ", "report").await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_full_run_with_empty_context_completes() {
    let (service, provider, store) = service(FailurePolicy::Fallback);
    let (handle, _) = service.start(tenant(), "No upload", "").await.unwrap();
    service.approve(&handle).await.unwrap();
    service
        .toggle_idea(&handle, &IdeaId::new("idea-1").unwrap())
        .await
        .unwrap();
    // ideation approval runs research unattended and stops at narrative
    let report = service.approve(&handle).await.unwrap();
    assert_eq!(report.stage, Some(StageId::Narrative));
    service.approve(&handle).await.unwrap();
    let report = service.approve(&handle).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stage, None);
    assert_eq!(provider.requests().len(), 5);

    let saved = record(&store, &handle).await;
    assert_eq!(saved.status, RunStatus::Completed);
    assert_eq!(saved.current_stage, 5);
    assert_eq!(saved.outputs.len(), 5);

    assert!(matches!(service.approve(&handle).await, Err(PipelineError::RunCompleted)));
}

#[tokio::test]
async fn test_status_round_trips_through_store() {
    let (service, _, store) = service(FailurePolicy::Fallback);
    let handle = run_to_narrative(&service).await;
    let id = handle.snapshot().await.id().unwrap();

    let saved = record(&store, &handle).await;
    assert_eq!(saved.status, RunStatus::Stage(StageId::Narrative));
    assert_eq!(saved.current_stage, 3);

    let resumed = service.resume(&tenant(), id).await.unwrap().snapshot().await;
    let catalog = service.catalog();
    assert_eq!(resumed.current_stage(), 3);
    assert_eq!(resumed.stage_state(catalog, StageId::Research), Some(StageState::Approved));
    assert_eq!(resumed.stage_state(catalog, StageId::Narrative), Some(StageState::Editing));
    assert_eq!(resumed.stage_state(catalog, StageId::Writing), Some(StageState::Pending));

    let listed = service.list(&tenant()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, RunStatus::Stage(StageId::Narrative));
}

#[tokio::test]
async fn test_ideation_requires_selection_without_network_call() {
    let (service, provider, _) = service(FailurePolicy::Fallback);
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    let calls = provider.requests().len();

    let err = service.approve(&handle).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
    assert_eq!(provider.requests().len(), calls);
    assert!(!handle.is_busy());

    assert!(service.toggle_idea(&handle, &IdeaId::new("idea-1").unwrap()).await.unwrap());
    assert!(!service.toggle_idea(&handle, &IdeaId::new("idea-1").unwrap()).await.unwrap());
    assert!(service.approve(&handle).await.is_err());
}

#[tokio::test]
async fn test_selected_ideas_feed_research() {
    let (service, provider, _) = service(FailurePolicy::Fallback);
    provider.script(
        "test/ideation",
        Ok(r#"{"ideas": [{"title": "Reels"}, {"title": "Carousels"}, {"title": "Lives"}]}"#),
    );
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    assert_eq!(handle.snapshot().await.ideas().len(), 3);

    service
        .toggle_idea(&handle, &IdeaId::new("idea-2").unwrap())
        .await
        .unwrap();
    service.approve(&handle).await.unwrap();

    let research = provider
        .requests()
        .into_iter()
        .find(|r| r.model.as_str() == "test/research")
        .unwrap();
    assert!(research.user.contains("Carousels"));
    assert!(!research.user.contains("Reels"));
}

#[tokio::test]
async fn test_edited_text_is_next_stage_context() {
    let (service, provider, store) = service(FailurePolicy::Fallback);
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.edit(&handle, "my corrected analysis").await.unwrap();

    let saved = record(&store, &handle).await;
    assert_eq!(saved.outputs[&StageId::Analysis].origin, OutputOrigin::Edited);

    service.approve(&handle).await.unwrap();
    let ideation = provider.last_request();
    assert_eq!(ideation.model.as_str(), "test/ideation");
    assert!(ideation.user.contains("my corrected analysis"));
    assert!(!ideation.user.contains("test/analysis output"));
}

#[tokio::test]
async fn test_regenerate_replaces_only_current_output() {
    let (service, provider, store) = service(FailurePolicy::Fallback);
    provider.script("test/ideation", Ok(r#"["First idea"]"#));
    provider.script("test/ideation", Ok(r#"["Second idea"]"#));
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.edit(&handle, "edited analysis").await.unwrap();
    service.approve(&handle).await.unwrap();

    let report = service.regenerate(&handle).await.unwrap();
    assert_eq!(report.stage, Some(StageId::Ideation));
    assert_eq!(report.stage_state, Some(StageState::Editing));

    let requests = provider.requests();
    let last = &requests[requests.len() - 1];
    let first = &requests[requests.len() - 2];
    assert_eq!(last.user, first.user);
    assert!(last.user.contains("edited analysis"));

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.ideas()[0].title, "Second idea");
    let saved = record(&store, &handle).await;
    assert_eq!(saved.outputs[&StageId::Analysis].content, "edited analysis");
    assert!(saved.outputs[&StageId::Ideation].content.contains("Second idea"));
}

#[tokio::test]
async fn test_touchpoints_follow_catalog_flags() {
    let catalog = StageCatalog::new(vec![
        StageDefinition::new(StageId::Analysis, "Analysis", true, model("test/analysis")),
        StageDefinition::new(StageId::Research, "Research", true, model("test/research")),
        StageDefinition::new(StageId::Writing, "Writing", false, model("test/writing")),
    ])
    .unwrap();
    let (service, provider, store) = service_with(catalog, FailurePolicy::Fallback);

    let (handle, report) = service.start(tenant(), "Short run", "report").await.unwrap();
    assert_eq!(report.stage, Some(StageId::Analysis));

    let report = service.approve(&handle).await.unwrap();
    assert_eq!(report.stage, Some(StageId::Research));
    assert_eq!(report.stage_state, Some(StageState::Editing));
    assert_eq!(provider.requests().len(), 2);

    let report = service.approve(&handle).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(provider.requests().len(), 3);
    assert_eq!(record(&store, &handle).await.current_stage, 3);
}

#[tokio::test]
async fn test_provider_failure_under_fallback_policy_shows_demo_output() {
    let (service, provider, store) = service(FailurePolicy::Fallback);
    provider.script(
        "test/research",
        Err(ProviderError::Http {
            status: 500,
            body: "boom".to_string(),
        }),
    );
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    service
        .toggle_idea(&handle, &IdeaId::new("idea-1").unwrap())
        .await
        .unwrap();
    let report = service.approve(&handle).await.unwrap();

    assert!(report.used_demo_output());
    assert!(matches!(
        report.notices.as_slice(),
        [Notice::DemoOutput { stage: StageId::Research, .. }]
    ));
    assert_eq!(report.stage, Some(StageId::Narrative));

    let saved = record(&store, &handle).await;
    assert_eq!(saved.outputs[&StageId::Research].origin, OutputOrigin::Fallback);
    assert_eq!(saved.outputs[&StageId::Research].model, None);
}

#[tokio::test]
async fn test_provider_failure_under_strict_policy_stops_and_retries() {
    let (service, provider, store) = service(FailurePolicy::Strict);
    provider.script(
        "test/research",
        Err(ProviderError::Http {
            status: 500,
            body: "boom".to_string(),
        }),
    );
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    service
        .toggle_idea(&handle, &IdeaId::new("idea-1").unwrap())
        .await
        .unwrap();

    let err = service.approve(&handle).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Provider {
            stage: StageId::Research,
            ..
        }
    ));
    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.status(), RunStatus::Stage(StageId::Ideation));
    assert_eq!(
        snapshot.stage_state(service.catalog(), StageId::Research),
        Some(StageState::Pending)
    );
    assert!(snapshot.output(StageId::Research).is_none());
    assert_eq!(record(&store, &handle).await.status, RunStatus::Stage(StageId::Ideation));

    let report = service.retry(&handle).await.unwrap();
    assert_eq!(report.stage, Some(StageId::Narrative));
    assert!(report.notices.is_empty());
}

#[tokio::test]
async fn test_strict_failure_survives_resume_and_retries() {
    let (service, provider, store) = service(FailurePolicy::Strict);
    provider.script("test/ideation", Ok(r#"["Reels", "Lives"]"#));
    provider.script(
        "test/research",
        Err(ProviderError::Http {
            status: 500,
            body: "boom".to_string(),
        }),
    );
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    service
        .toggle_idea(&handle, &IdeaId::new("idea-2").unwrap())
        .await
        .unwrap();
    assert!(service.approve(&handle).await.is_err());

    let saved = record(&store, &handle).await;
    assert_eq!(saved.status, RunStatus::Stage(StageId::Ideation));
    let pending = saved.pending.clone().unwrap();
    assert_eq!(pending.stage, StageId::Research);
    assert!(pending.context.contains("Lives"));

    let resumed = service.resume(&tenant(), saved.id).await.unwrap();
    let snapshot = resumed.snapshot().await;
    assert_eq!(snapshot.current_stage(), 2);
    assert_eq!(
        snapshot.stage_state(service.catalog(), StageId::Ideation),
        Some(StageState::Approved)
    );

    let report = service.retry(&resumed).await.unwrap();
    assert_eq!(report.stage, Some(StageId::Narrative));
    assert_eq!(report.stage_state, Some(StageState::Editing));
    let research = provider
        .requests()
        .into_iter()
        .rev()
        .find(|r| r.model.as_str() == "test/research")
        .unwrap();
    assert!(research.user.contains("Lives"));
    assert!(!research.user.contains("Reels"));

    let saved = record(&store, &resumed).await;
    assert_eq!(saved.status, RunStatus::Stage(StageId::Narrative));
    assert!(saved.pending.is_none());
}

#[tokio::test]
async fn test_strict_regenerate_failure_keeps_previous_output() {
    let (service, provider, store) = service(FailurePolicy::Strict);
    provider.script("test/ideation", Ok(r#"["First idea"]"#));
    provider.script(
        "test/ideation",
        Err(ProviderError::Http {
            status: 500,
            body: "boom".to_string(),
        }),
    );
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    service.approve(&handle).await.unwrap();
    service
        .toggle_idea(&handle, &IdeaId::new("idea-1").unwrap())
        .await
        .unwrap();

    let err = service.regenerate(&handle).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Provider {
            stage: StageId::Ideation,
            ..
        }
    ));

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.status(), RunStatus::Stage(StageId::Ideation));
    assert_eq!(
        snapshot.stage_state(service.catalog(), StageId::Ideation),
        Some(StageState::Editing)
    );
    assert_eq!(snapshot.output(StageId::Ideation).unwrap().content, r#"["First idea"]"#);
    assert_eq!(snapshot.ideas()[0].title, "First idea");
    assert_eq!(snapshot.selection().len(), 1);

    let saved = record(&store, &handle).await;
    assert_eq!(saved.outputs[&StageId::Ideation].content, r#"["First idea"]"#);
    assert!(saved.pending.is_none());

    // the run carries on from the restored output
    let report = service.approve(&handle).await.unwrap();
    assert_eq!(report.stage, Some(StageId::Narrative));
}

#[tokio::test]
async fn test_brand_identity_reaches_stage_prompt() {
    let provider = ScriptedProvider::default();
    let runner = StageRunner::new(provider.clone(), FailurePolicy::Fallback);
    let brand = BrandIdentity {
        name: "Eter".to_string(),
        tone_of_voice: "Warm and direct".to_string(),
        ..Default::default()
    };
    let service = PipelineService::new(catalog(), runner, FlakyStore::default()).with_brand(brand);

    service.start(tenant(), "Spring launch", "report").await.unwrap();
    let request = provider.last_request();
    assert_eq!(request.model.as_str(), "test/analysis");
    assert!(request.user.contains("Brand: Eter"));
    assert!(request.user.contains("Tone of voice: Warm and direct"));
}

#[tokio::test]
async fn test_strict_failure_on_first_stage_creates_no_run() {
    let (service, provider, store) = service(FailurePolicy::Strict);
    provider.script(
        "test/analysis",
        Err(ProviderError::MissingCredentials {
            provider: "scripted".to_string(),
        }),
    );
    assert!(service.start(tenant(), "Spring launch", "report").await.is_err());
    assert!(store.list(&tenant()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fallback_model_answers_after_retryable_failure() {
    let provider = ScriptedProvider::default();
    let store = FlakyStore::default();
    let runner = StageRunner::new(provider.clone(), FailurePolicy::Strict)
        .with_fallback_model(model("test/fallback"));
    let service = PipelineService::new(catalog(), runner, store.clone());
    provider.script("test/analysis", Err(ProviderError::Timeout { after: std::time::Duration::from_secs(45) }));

    let (handle, report) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    match report.notices.as_slice() {
        [Notice::ModelFallback { requested, used, .. }] => {
            assert_eq!(requested.as_str(), "test/analysis");
            assert_eq!(used.as_str(), "test/fallback");
        }
        other => panic!("unexpected notices: {other:?}"),
    }
    let output = record(&store, &handle).await.outputs[&StageId::Analysis].clone();
    assert_eq!(output.model, Some(model("test/fallback")));
    assert_eq!(output.content, "test/fallback output");
}

#[tokio::test]
async fn test_non_retryable_failure_skips_fallback_model() {
    let provider = ScriptedProvider::default();
    let runner = StageRunner::new(provider.clone(), FailurePolicy::Fallback)
        .with_fallback_model(model("test/fallback"));
    let service = PipelineService::new(catalog(), runner, FlakyStore::default());
    provider.script(
        "test/analysis",
        Err(ProviderError::Http {
            status: 401,
            body: "bad key".to_string(),
        }),
    );

    let (_, report) = service.start(tenant(), "Spring launch", "report").await.unwrap();
    assert_eq!(provider.requests().len(), 1);
    assert!(report.used_demo_output());
}

#[tokio::test]
async fn test_failed_save_keeps_progress_until_saved() {
    let (service, _, store) = service(FailurePolicy::Fallback);
    store.set_failing(true);
    let (handle, report) = service.start(tenant(), "Spring launch", "report").await.unwrap();

    assert!(report.save_failed());
    assert_eq!(report.run_id, None);
    let snapshot = handle.snapshot().await;
    assert!(snapshot.is_dirty());
    assert!(snapshot.output(StageId::Analysis).is_some());

    // still failing: explicit save surfaces the error
    assert!(matches!(service.save(&handle).await, Err(PipelineError::Store(_))));

    store.set_failing(false);
    let report = service.save(&handle).await.unwrap();
    let id = report.run_id.unwrap();
    assert!(!handle.snapshot().await.is_dirty());
    let saved = store.select(&tenant(), id).await.unwrap();
    assert_eq!(saved.status, RunStatus::Stage(StageId::Analysis));
    assert_eq!(saved.title, "Spring launch");
}

#[tokio::test]
async fn test_board_edits_are_persisted_and_reach_writing() {
    let (service, provider, store) = service(FailurePolicy::Fallback);
    provider.script("test/narrative", Ok("Hook line\n\nBody line\n\nClose line"));
    let handle = run_to_narrative(&service).await;
    assert_eq!(handle.snapshot().await.board().len(), 3);

    service.move_block(&handle, 2, 0).await.unwrap();
    service.edit_block(&handle, 1, "Hook, sharpened").await.unwrap();
    let saved = record(&store, &handle).await;
    assert_eq!(saved.outputs[&StageId::Narrative].origin, OutputOrigin::Edited);
    assert!(saved.outputs[&StageId::Narrative].content.contains("Hook, sharpened"));

    assert!(matches!(
        service.reorder_blocks(&handle, &[0, 0, 1]).await,
        Err(PipelineError::Validation { .. })
    ));

    service.approve(&handle).await.unwrap();
    let writing = provider.last_request();
    assert_eq!(writing.model.as_str(), "test/writing");
    let close = writing.user.find("Close line").unwrap();
    let hook = writing.user.find("Hook, sharpened").unwrap();
    assert!(close < hook);
    assert!(!writing.user.contains("Hook line"));
}

#[tokio::test]
async fn test_second_call_while_busy_is_rejected() {
    let (service, provider, _) = service(FailurePolicy::Fallback);
    let service = Arc::new(service);
    let (handle, _) = service.start(tenant(), "Spring launch", "report").await.unwrap();

    provider.hold_next();
    let background = {
        let service = Arc::clone(&service);
        let handle = handle.clone();
        tokio::spawn(async move { service.regenerate(&handle).await })
    };
    while !handle.is_busy() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(service.approve(&handle).await, Err(PipelineError::Busy)));
    assert!(matches!(service.edit(&handle, "x").await, Err(PipelineError::Busy)));

    provider.release();
    let report = background.await.unwrap().unwrap();
    assert_eq!(report.stage_state, Some(StageState::Editing));
    assert!(!handle.is_busy());
    service.approve(&handle).await.unwrap();
}
