//! Work-set selection.
//!
//! Pure planning: given the narrative feed and the prior outcomes recorded
//! under the active prompt version, decide exactly which fingerprints still
//! need work. No side effects; re-invocation with unchanged inputs returns
//! the same plan.

use std::collections::{HashMap, HashSet};

use crate::models::{AttemptStatus, Narrative};
use crate::repository::AttemptState;

/// One unit of extraction work: a unique fingerprint with its representative
/// narrative (first occurrence in feed order).
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub narrative: Narrative,
    pub fingerprint: String,
    /// Retries already consumed by earlier runs.
    pub resume_retry_count: u32,
}

/// The planned work set plus bookkeeping for the run report.
#[derive(Debug, Default)]
pub struct WorkPlan {
    pub units: Vec<WorkUnit>,
    /// Narratives skipped for empty or too-short text.
    pub skipped_short: usize,
    /// Narratives collapsed into another unit with identical text.
    pub duplicates: usize,
    /// Fingerprints already holding an extraction under this version.
    pub already_completed: usize,
    /// Fingerprints already terminally failed under this version.
    pub already_failed: usize,
}

/// Select the narratives whose (fingerprint, active version) pair still needs
/// work.
///
/// A fingerprint is re-eligible when its attempt failed with retry budget
/// remaining, or when an attempt completed but was never parsed into an
/// extraction or failure (a run interrupted between the model call and
/// validation).
pub fn plan_work(
    narratives: &[Narrative],
    prior: &HashMap<String, AttemptState>,
    min_chars: usize,
) -> WorkPlan {
    let mut plan = WorkPlan::default();
    let mut seen: HashSet<String> = HashSet::new();

    for narrative in narratives {
        if narrative.eligible_text(min_chars).is_none() {
            plan.skipped_short += 1;
            continue;
        }

        let fingerprint = narrative.content_fingerprint();
        if !seen.insert(fingerprint.clone()) {
            plan.duplicates += 1;
            continue;
        }

        let resume_retry_count = match prior.get(&fingerprint) {
            None => 0,
            Some(state) if state.has_extraction => {
                plan.already_completed += 1;
                continue;
            }
            Some(state) if state.has_failure => {
                plan.already_failed += 1;
                continue;
            }
            Some(state) => match state.status {
                // Completed but unparsed: resume from validation.
                AttemptStatus::Completed => state.retry_count,
                AttemptStatus::Pending => state.retry_count,
                // Failed attempts carry their consumed budget; exhausted ones
                // still pass through so the run can seal them as terminal
                // failures.
                AttemptStatus::Failed => state.retry_count,
            },
        };

        plan.units.push(WorkUnit {
            narrative: narrative.clone(),
            fingerprint,
            resume_retry_count,
        });
    }

    plan
}
