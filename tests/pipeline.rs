//! End-to-end pipeline tests against a scripted model backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use narramine::cache::ExtractionCache;
use narramine::config::PipelineSettings;
use narramine::llm::{GenerationParams, LlmError, ModelBackend};
use narramine::models::Narrative;
use narramine::pipeline::{ExtractionService, RunReport};
use narramine::prompt::default_prompt_version;
use narramine::rate_limit::Pacer;
use narramine::repository::Store;

/// One scripted backend response.
enum Script {
    Ok(String),
    ConnectionError(String),
}

/// Backend that replays a scripted response sequence and counts calls.
struct ScriptedBackend {
    responses: tokio::sync::Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(responses: Vec<Script>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn model_id(&self) -> &str {
        "scripted-test-model"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().await.pop_front() {
            Some(Script::Ok(raw)) => Ok(raw),
            Some(Script::ConnectionError(msg)) => Err(LlmError::Connection(msg)),
            None => Err(LlmError::Connection("script exhausted".to_string())),
        }
    }
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn store(&self) -> Store {
        let store = Store::new(&self.dir.path().join("test.db")).unwrap();
        store.insert_prompt_version(&default_prompt_version()).unwrap();
        store
    }

    fn cache(&self) -> ExtractionCache {
        ExtractionCache::new(&self.dir.path().join("cache")).unwrap()
    }

    fn service(&self, backend: Arc<ScriptedBackend>) -> ExtractionService {
        ExtractionService::new(
            self.store(),
            self.cache(),
            backend,
            Pacer::unlimited(),
            PipelineSettings::default(),
        )
    }
}

fn narrative(id: &str, text: &str) -> Narrative {
    Narrative {
        id: id.to_string(),
        title: format!("Project {id}"),
        text: text.to_string(),
        technologies: vec!["react native".to_string()],
        event: Some("Health Hack".to_string()),
        submitted_at: Some(Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()),
        created_at: Utc::now(),
    }
}

const SKIN_SCAN_TEXT: &str = "We built a mobile app using React Native and TensorFlow \
     to detect skin conditions from photos, aimed at underserved rural clinics";

const SKIN_SCAN_RESPONSE: &str = r#"{
    "themes": ["healthcare_medical", "artificial_intelligence_ml"],
    "theme_confidence": 0.92,
    "project_type": "mobile_app",
    "use_cases": ["detect skin conditions from photos"],
    "target_audience": ["rural clinics"],
    "technologies_mentioned": ["react native", "tensorflow"],
    "sentiment_score": 0.6,
    "enthusiasm_level": "high",
    "summary_200": "Mobile app for skin condition detection in rural clinics.",
    "key_innovation": "Photo-based diagnosis",
    "problem_addressed": "Limited dermatology access",
    "solution_approach": "On-device image classification",
    "has_clear_problem": true,
    "has_clear_solution": true,
    "has_impact_metrics": false,
    "contains_pii": false
}"#;

fn response_with_confidence(confidence: f64) -> String {
    format!(
        r#"{{"themes": ["productivity_tools"], "theme_confidence": {confidence},
            "sentiment_score": 0.1, "project_type": "web_app"}}"#
    )
}

async fn run(service: &ExtractionService) -> RunReport {
    let (tx, rx) = mpsc::channel(16);
    drop(rx);
    service.run(tx).await.unwrap()
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", SKIN_SCAN_TEXT))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![Script::Ok(
        SKIN_SCAN_RESPONSE.to_string(),
    )]));
    let service = fixture.service(backend.clone());
    let report = run(&service).await;

    assert_eq!(report.selected, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.live_calls, 1);
    assert_eq!(backend.calls(), 1);

    let fingerprint = Narrative::fingerprint(SKIN_SCAN_TEXT);
    let extraction = store.get_extraction(&fingerprint, "v2").unwrap().unwrap();
    assert_eq!(
        extraction.themes,
        vec!["healthcare_medical", "artificial_intelligence_ml"]
    );
    assert_eq!(extraction.theme_confidence, 0.92);
    assert!(!extraction.low_confidence);

    // No double counting: the record contributes exactly once to each of its
    // two theme buckets and to no other bucket.
    let engine = narramine::aggregate::AggregationEngine::new(&store);
    let summary = engine.theme_summary("v2", 0.6).unwrap();
    assert_eq!(summary.len(), 2);
    for entry in &summary {
        assert_eq!(entry.count, 1);
        assert!(
            entry.theme == "healthcare_medical" || entry.theme == "artificial_intelligence_ml"
        );
    }
}

#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", SKIN_SCAN_TEXT))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![Script::Ok(
        SKIN_SCAN_RESPONSE.to_string(),
    )]));
    let service = fixture.service(backend.clone());

    let first = run(&service).await;
    assert_eq!(first.completed, 1);

    let fingerprint = Narrative::fingerprint(SKIN_SCAN_TEXT);
    let before = store.get_extraction(&fingerprint, "v2").unwrap().unwrap();

    // Second run with an unchanged store and prompt version does no new work.
    let second = run(&service).await;
    assert_eq!(second.selected, 0);
    assert_eq!(second.already_completed, 1);
    assert_eq!(second.live_calls, 0);
    assert_eq!(backend.calls(), 1);

    let after = store.get_extraction(&fingerprint, "v2").unwrap().unwrap();
    assert_eq!(before.id, after.id);
    assert_eq!(before.themes, after.themes);
    assert_eq!(before.processed_at, after.processed_at);
}

#[tokio::test]
async fn test_confidence_gating_boundary() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", "first narrative exactly at the threshold"))
        .unwrap();
    store
        .insert_narrative(&narrative("s2", "second narrative just below the threshold"))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![
        Script::Ok(response_with_confidence(0.6)),
        Script::Ok(response_with_confidence(0.59999)),
    ]));
    let service = fixture.service(backend);
    let report = run(&service).await;

    assert_eq!(report.completed, 2);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.low_confidence, 1);

    // Both records persist; the threshold-filtered aggregation sees only one.
    let engine = narramine::aggregate::AggregationEngine::new(&store);
    let filtered = engine.theme_summary("v2", 0.6).unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].count, 1);

    let unfiltered = engine.theme_summary("v2", 0.0).unwrap();
    assert_eq!(unfiltered[0].count, 2);

    let (accepted, low) = store.count_extractions("v2").unwrap();
    assert_eq!((accepted, low), (1, 1));
}

#[tokio::test]
async fn test_retry_ceiling_terminates_exactly_once() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", "a narrative the provider rejects"))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![
        Script::ConnectionError("reset".to_string()),
        Script::ConnectionError("reset".to_string()),
        Script::ConnectionError("reset".to_string()),
        Script::ConnectionError("reset".to_string()),
    ]));
    let service = fixture.service(backend.clone());

    let report = run(&service).await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.live_calls, 3);
    assert_eq!(backend.calls(), 3);

    let failures = store.list_failed_extractions("v2").unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].retry_count, 3);
    assert!(failures[0].raw_response.is_none());

    // The terminal failure is permanently excluded from automatic retry.
    let second = run(&service).await;
    assert_eq!(second.selected, 0);
    assert_eq!(second.already_failed, 1);
    assert_eq!(backend.calls(), 3);
    assert_eq!(store.list_failed_extractions("v2").unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_response_fails_without_retry() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", "a narrative that confuses the model"))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![Script::Ok(
        "I am sorry, I cannot help with that.".to_string(),
    )]));
    let service = fixture.service(backend.clone());
    let report = run(&service).await;

    // One call, no automatic re-ask of a non-deterministic model.
    assert_eq!(backend.calls(), 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.completed, 0);

    let failures = store.list_failed_extractions("v2").unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].raw_response.is_some());
    assert!(failures[0].error.contains("Malformed"));
}

#[tokio::test]
async fn test_short_narratives_are_never_attempted() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store.insert_narrative(&narrative("s1", "123456789")).unwrap();
    store.insert_narrative(&narrative("s2", "1234567890")).unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![Script::Ok(
        response_with_confidence(0.8),
    )]));
    let service = fixture.service(backend.clone());
    let report = run(&service).await;

    assert_eq!(report.skipped_short, 1);
    assert_eq!(report.selected, 1);
    assert_eq!(backend.calls(), 1);

    // The short narrative stays skipped on re-runs, not retried.
    let second = run(&service).await;
    assert_eq!(second.skipped_short, 1);
    assert_eq!(second.selected, 0);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_cache_hit_bypasses_model() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", SKIN_SCAN_TEXT))
        .unwrap();

    // Pre-populate the cache as if an earlier deployment answered already.
    let fingerprint = Narrative::fingerprint(SKIN_SCAN_TEXT);
    fixture
        .cache()
        .put(&fingerprint, "v2", SKIN_SCAN_RESPONSE)
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let service = fixture.service(backend.clone());
    let report = run(&service).await;

    assert_eq!(report.cache_hits, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.live_calls, 0);
    assert_eq!(backend.calls(), 0);
    assert!(store.get_extraction(&fingerprint, "v2").unwrap().is_some());
}

#[tokio::test]
async fn test_prompt_version_change_reopens_fingerprints() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", SKIN_SCAN_TEXT))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![
        Script::Ok(SKIN_SCAN_RESPONSE.to_string()),
        Script::Ok(SKIN_SCAN_RESPONSE.to_string()),
    ]));
    let service = fixture.service(backend.clone());

    let first = run(&service).await;
    assert_eq!(first.completed, 1);

    let mut v3 = default_prompt_version();
    v3.version = "v3".to_string();
    v3.active = false;
    store.insert_prompt_version(&v3).unwrap();
    store.activate_prompt("v3").unwrap();

    // The same fingerprint is fresh work under the new version; the old
    // extraction is untouched.
    let second = run(&service).await;
    assert_eq!(second.selected, 1);
    assert_eq!(second.completed, 1);
    assert_eq!(backend.calls(), 2);

    let fingerprint = Narrative::fingerprint(SKIN_SCAN_TEXT);
    assert!(store.get_extraction(&fingerprint, "v2").unwrap().is_some());
    assert!(store.get_extraction(&fingerprint, "v3").unwrap().is_some());
}

#[tokio::test]
async fn test_duplicate_narratives_share_one_extraction() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", SKIN_SCAN_TEXT))
        .unwrap();
    store
        .insert_narrative(&narrative("s2", SKIN_SCAN_TEXT))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![Script::Ok(
        SKIN_SCAN_RESPONSE.to_string(),
    )]));
    let service = fixture.service(backend.clone());
    let report = run(&service).await;

    assert_eq!(report.selected, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(backend.calls(), 1);

    // Both submissions remain individually reportable through the join.
    let fingerprint = Narrative::fingerprint(SKIN_SCAN_TEXT);
    let ids = store.narrative_ids_for_fingerprint(&fingerprint).unwrap();
    assert_eq!(ids, vec!["s1", "s2"]);
}

#[tokio::test]
async fn test_transient_error_then_success_retries() {
    let fixture = Fixture::new();
    let store = fixture.store();
    store
        .insert_narrative(&narrative("s1", "a narrative behind a flaky network"))
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new(vec![
        Script::ConnectionError("timeout".to_string()),
        Script::Ok(response_with_confidence(0.9)),
    ]));
    let service = fixture.service(backend.clone());
    let report = run(&service).await;

    assert_eq!(backend.calls(), 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(store.list_failed_extractions("v2").unwrap().len(), 0);
}
