//! The narrative extraction pipeline.
//!
//! A single logical worker iterates the work set sequentially: the provider
//! quota is per-account, so parallelism buys nothing and risks throttling.
//! Per-narrative failures never abort the run; only configuration problems
//! (no active prompt, no API key for live work) are fatal up front.
//!
//! Separated from UI concerns - emits events for progress tracking.

mod dedup;

pub use dedup::{plan_work, WorkPlan, WorkUnit};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::ExtractionCache;
use crate::config::PipelineSettings;
use crate::llm::{GenerationParams, ModelBackend};
use crate::models::{FailedExtraction, PromptVersion, StructuredExtraction};
use crate::prompt::render_prompt;
use crate::rate_limit::{backoff_delay, Pacer};
use crate::repository::Store;
use crate::validator::parse_candidate;

/// Base interval for the exponential retry backoff.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Events emitted during pipeline processing.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Run started; `total` is the capped work-set size.
    Started { total: usize },
    /// A work unit is being processed.
    UnitStarted { narrative_id: String, title: String },
    /// Raw response served from cache, no model call made.
    CacheHit { fingerprint: String },
    /// Unit produced a structured extraction.
    Extracted {
        fingerprint: String,
        low_confidence: bool,
    },
    /// Unit terminally failed.
    UnitFailed { fingerprint: String, error: String },
    /// Run finished.
    Complete { report: RunReport },
}

/// Per-invocation summary.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Work units selected for this run (after the batch cap).
    pub selected: usize,
    /// Narratives skipped for empty or too-short text.
    pub skipped_short: usize,
    /// Narratives collapsed into an identical-text unit.
    pub duplicates: usize,
    /// Fingerprints already extracted under this version.
    pub already_completed: usize,
    /// Fingerprints already terminally failed, excluded from retry.
    pub already_failed: usize,
    /// Units served from the extraction cache.
    pub cache_hits: usize,
    /// Units newly parsed into a structured extraction.
    pub completed: usize,
    /// Of `completed`, those at or above the confidence threshold.
    pub accepted: usize,
    /// Of `completed`, those below the confidence threshold (kept, tagged).
    pub low_confidence: usize,
    /// Units newly routed to the failure log.
    pub failed: usize,
    /// Live model requests issued, including retries.
    pub live_calls: usize,
    /// Estimated provider cost for this run.
    pub estimated_cost: f64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

enum UnitOutcome {
    Extracted { low_confidence: bool },
    Failed { error: String },
}

enum RawResponse {
    FromCache(String),
    Live(String),
    Exhausted { error: String, retries: u32 },
}

/// Service that drives narratives through extraction into the analytics store.
pub struct ExtractionService {
    store: Store,
    cache: ExtractionCache,
    backend: Arc<dyn ModelBackend>,
    pacer: Pacer,
    settings: PipelineSettings,
    cancel: Arc<AtomicBool>,
}

impl ExtractionService {
    /// Create a new extraction service.
    pub fn new(
        store: Store,
        cache: ExtractionCache,
        backend: Arc<dyn ModelBackend>,
        pacer: Pacer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            cache,
            backend,
            pacer,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag. Honored between narratives, never
    /// mid-request.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run the pipeline over every eligible narrative.
    pub async fn run(
        &self,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> anyhow::Result<RunReport> {
        let started = Instant::now();
        let prompt = self.store.require_active_prompt()?;

        let narratives = self.store.list_narratives()?;
        let prior: HashMap<String, _> = self
            .store
            .attempt_states(&prompt.version)?
            .into_iter()
            .map(|state| (state.fingerprint.clone(), state))
            .collect();

        let plan = plan_work(&narratives, &prior, self.settings.min_narrative_chars);

        let mut report = RunReport {
            skipped_short: plan.skipped_short,
            duplicates: plan.duplicates,
            already_completed: plan.already_completed,
            already_failed: plan.already_failed,
            ..Default::default()
        };

        let units: Vec<WorkUnit> = if self.settings.batch_limit > 0 {
            plan.units
                .into_iter()
                .take(self.settings.batch_limit)
                .collect()
        } else {
            plan.units
        };
        report.selected = units.len();

        info!(
            "Processing {} narratives under prompt {} ({} skipped short, {} done, {} failed)",
            report.selected,
            prompt.version,
            report.skipped_short,
            report.already_completed,
            report.already_failed
        );
        let _ = event_tx
            .send(PipelineEvent::Started {
                total: report.selected,
            })
            .await;

        for unit in units {
            if self.cancel.load(Ordering::Relaxed) {
                info!("Cancellation requested, stopping before next narrative");
                break;
            }

            let _ = event_tx
                .send(PipelineEvent::UnitStarted {
                    narrative_id: unit.narrative.id.clone(),
                    title: unit.narrative.title.clone(),
                })
                .await;

            match self.process_unit(&unit, &prompt, &mut report, &event_tx).await {
                Ok(UnitOutcome::Extracted { low_confidence }) => {
                    report.completed += 1;
                    if low_confidence {
                        report.low_confidence += 1;
                    } else {
                        report.accepted += 1;
                    }
                    let _ = event_tx
                        .send(PipelineEvent::Extracted {
                            fingerprint: unit.fingerprint.clone(),
                            low_confidence,
                        })
                        .await;
                }
                Ok(UnitOutcome::Failed { error }) => {
                    report.failed += 1;
                    let _ = event_tx
                        .send(PipelineEvent::UnitFailed {
                            fingerprint: unit.fingerprint.clone(),
                            error,
                        })
                        .await;
                }
                Err(e) => {
                    // Store-level problems are not per-narrative noise; abort.
                    return Err(e);
                }
            }
        }

        report.estimated_cost = report.live_calls as f64 * self.settings.cost_per_request;
        report.elapsed = started.elapsed();
        let _ = event_tx
            .send(PipelineEvent::Complete {
                report: report.clone(),
            })
            .await;
        Ok(report)
    }

    /// Process one work unit to an extraction or a terminal failure.
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        prompt: &PromptVersion,
        report: &mut RunReport,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> anyhow::Result<UnitOutcome> {
        let raw = match self.obtain_raw(unit, prompt, report).await? {
            RawResponse::FromCache(raw) => {
                report.cache_hits += 1;
                let _ = event_tx
                    .send(PipelineEvent::CacheHit {
                        fingerprint: unit.fingerprint.clone(),
                    })
                    .await;
                raw
            }
            RawResponse::Live(raw) => raw,
            RawResponse::Exhausted { error, retries } => {
                self.store.insert_failed_extraction(&FailedExtraction {
                    fingerprint: unit.fingerprint.clone(),
                    prompt_version: prompt.version.clone(),
                    raw_response: None,
                    error: error.clone(),
                    retry_count: retries,
                    failed_at: Utc::now(),
                })?;
                return Ok(UnitOutcome::Failed { error });
            }
        };

        match parse_candidate(&raw) {
            Ok(candidate) => {
                let low_confidence =
                    candidate.theme_confidence < self.settings.confidence_threshold;
                let extraction = StructuredExtraction {
                    id: 0,
                    narrative_id: unit.narrative.id.clone(),
                    fingerprint: unit.fingerprint.clone(),
                    prompt_version: prompt.version.clone(),
                    themes: candidate.themes,
                    theme_confidence: candidate.theme_confidence,
                    project_type: candidate.project_type,
                    use_cases: candidate.use_cases,
                    target_audience: candidate.target_audience,
                    technologies: candidate.technologies_mentioned,
                    sentiment_score: candidate.sentiment_score,
                    enthusiasm: candidate.enthusiasm_level,
                    summary: candidate.summary,
                    key_innovation: candidate.key_innovation,
                    problem_addressed: candidate.problem_addressed,
                    solution_approach: candidate.solution_approach,
                    has_clear_problem: candidate.has_clear_problem,
                    has_clear_solution: candidate.has_clear_solution,
                    has_impact_metrics: candidate.has_impact_metrics,
                    contains_pii: candidate.contains_pii,
                    narrative_length: unit.narrative.text.trim().chars().count() as i64,
                    low_confidence,
                    processed_at: Utc::now(),
                };
                self.store.insert_extraction(&extraction)?;
                Ok(UnitOutcome::Extracted { low_confidence })
            }
            Err(validate_err) => {
                // Not retried: re-asking a non-deterministic model the same
                // question is not a recovery path; a revised prompt version is.
                let error = validate_err.to_string();
                warn!("Validation failed for {}: {}", &unit.fingerprint[..8], error);
                let attempt = self
                    .store
                    .get_attempt(&unit.fingerprint, &prompt.version)?;
                self.store.insert_failed_extraction(&FailedExtraction {
                    fingerprint: unit.fingerprint.clone(),
                    prompt_version: prompt.version.clone(),
                    raw_response: Some(raw),
                    error: error.clone(),
                    retry_count: attempt.map(|a| a.retry_count).unwrap_or(0),
                    failed_at: Utc::now(),
                })?;
                Ok(UnitOutcome::Failed { error })
            }
        }
    }

    /// Get a raw response: from cache, from a prior completed attempt, or by
    /// issuing rate-limited live requests with bounded retry.
    async fn obtain_raw(
        &self,
        unit: &WorkUnit,
        prompt: &PromptVersion,
        report: &mut RunReport,
    ) -> anyhow::Result<RawResponse> {
        // Cache hit short-circuits the limiter and retry logic entirely.
        if let Some(raw) = self.cache.get(&unit.fingerprint, &prompt.version) {
            self.store
                .begin_attempt(&unit.fingerprint, &prompt.version, self.backend.model_id())?;
            self.store
                .complete_attempt(&unit.fingerprint, &prompt.version, &raw)?;
            return Ok(RawResponse::FromCache(raw));
        }

        // A completed attempt from an interrupted run already holds the
        // payload; backfill the cache and resume from validation.
        if let Some(attempt) = self.store.get_attempt(&unit.fingerprint, &prompt.version)? {
            if let Some(raw) = attempt.raw_response {
                self.cache.put(&unit.fingerprint, &prompt.version, &raw)?;
                return Ok(RawResponse::FromCache(raw));
            }
        }

        let mut retry_count = unit.resume_retry_count;
        if retry_count >= self.settings.max_retries {
            // Ceiling already consumed by earlier runs; seal as terminal.
            let attempt = self.store.get_attempt(&unit.fingerprint, &prompt.version)?;
            let error = attempt
                .and_then(|a| a.error)
                .unwrap_or_else(|| "retry ceiling exhausted".to_string());
            return Ok(RawResponse::Exhausted {
                error,
                retries: retry_count,
            });
        }

        self.store
            .begin_attempt(&unit.fingerprint, &prompt.version, self.backend.model_id())?;

        let rendered = render_prompt(&unit.narrative, prompt);
        let params = GenerationParams {
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
        };

        loop {
            self.pacer.acquire().await;
            report.live_calls += 1;

            match self.backend.generate(&rendered, &params).await {
                Ok(raw) => {
                    self.store
                        .complete_attempt(&unit.fingerprint, &prompt.version, &raw)?;
                    self.cache.put(&unit.fingerprint, &prompt.version, &raw)?;
                    return Ok(RawResponse::Live(raw));
                }
                Err(e) => {
                    retry_count += 1;
                    let terminal =
                        !e.is_retryable() || retry_count >= self.settings.max_retries;
                    let error = e.to_string();
                    self.store.record_attempt_failure(
                        &unit.fingerprint,
                        &prompt.version,
                        &error,
                        terminal,
                    )?;

                    if terminal {
                        return Ok(RawResponse::Exhausted {
                            error,
                            retries: retry_count,
                        });
                    }

                    let delay = backoff_delay(BACKOFF_BASE, retry_count - 1);
                    debug!(
                        "Request failed for {} (retry {}/{}), backing off {:?}: {}",
                        &unit.fingerprint[..8],
                        retry_count,
                        self.settings.max_retries,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
