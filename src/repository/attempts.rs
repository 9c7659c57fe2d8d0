//! Extraction attempt bookkeeping.
//!
//! Attempts are created pending, then transition to completed or failed.
//! The retry counter lives on the row so an interrupted run resumes its
//! retry budget instead of starting over.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{parse_datetime, Result, Store};
use crate::models::{AttemptStatus, ExtractionAttempt};

/// Prior-outcome summary for one fingerprint under a prompt version.
/// Input to work-set selection.
#[derive(Debug, Clone)]
pub struct AttemptState {
    pub fingerprint: String,
    pub status: AttemptStatus,
    pub retry_count: u32,
    pub has_extraction: bool,
    pub has_failure: bool,
}

fn row_to_attempt(row: &Row) -> rusqlite::Result<ExtractionAttempt> {
    let status: String = row.get(4)?;
    Ok(ExtractionAttempt {
        fingerprint: row.get(0)?,
        prompt_version: row.get(1)?,
        model: row.get(2)?,
        raw_response: row.get(3)?,
        status: AttemptStatus::from_str(&status).unwrap_or(AttemptStatus::Failed),
        error: row.get(5)?,
        retry_count: row.get::<_, i64>(6)? as u32,
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const ATTEMPT_COLUMNS: &str =
    "fingerprint, prompt_version, model, raw_response, status, error, retry_count, updated_at";

impl Store {
    /// Get the attempt for a (fingerprint, prompt version) pair.
    pub fn get_attempt(
        &self,
        fingerprint: &str,
        prompt_version: &str,
    ) -> Result<Option<ExtractionAttempt>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM extraction_attempts
             WHERE fingerprint = ? AND prompt_version = ?"
        ))?;
        let mut rows = stmt.query_map(params![fingerprint, prompt_version], row_to_attempt)?;
        match rows.next() {
            Some(attempt) => Ok(Some(attempt?)),
            None => Ok(None),
        }
    }

    /// Ensure a pending attempt row exists before the first request is issued.
    /// An existing row keeps its retry count.
    pub fn begin_attempt(
        &self,
        fingerprint: &str,
        prompt_version: &str,
        model: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO extraction_attempts
             (fingerprint, prompt_version, model, status, retry_count, updated_at)
             VALUES (?, ?, ?, 'pending', 0, ?)
             ON CONFLICT (fingerprint, prompt_version)
             DO UPDATE SET status = 'pending', model = excluded.model,
                           updated_at = excluded.updated_at",
            params![fingerprint, prompt_version, model, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record a successful model call: store the raw response verbatim and
    /// mark the attempt completed.
    pub fn complete_attempt(
        &self,
        fingerprint: &str,
        prompt_version: &str,
        raw_response: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE extraction_attempts
             SET status = 'completed', raw_response = ?, error = NULL, updated_at = ?
             WHERE fingerprint = ? AND prompt_version = ?",
            params![
                raw_response,
                Utc::now().to_rfc3339(),
                fingerprint,
                prompt_version
            ],
        )?;
        Ok(())
    }

    /// Record a failed request, incrementing the persisted retry counter.
    /// `terminal` marks the attempt failed; otherwise it stays pending for
    /// the next retry (possibly in a later run).
    pub fn record_attempt_failure(
        &self,
        fingerprint: &str,
        prompt_version: &str,
        error: &str,
        terminal: bool,
    ) -> Result<()> {
        let conn = self.connect()?;
        let status = if terminal { "failed" } else { "pending" };
        conn.execute(
            "UPDATE extraction_attempts
             SET status = ?, error = ?, retry_count = retry_count + 1, updated_at = ?
             WHERE fingerprint = ? AND prompt_version = ?",
            params![
                status,
                error,
                Utc::now().to_rfc3339(),
                fingerprint,
                prompt_version
            ],
        )?;
        Ok(())
    }

    /// Prior outcomes for every attempted fingerprint under a prompt version,
    /// joined against the extraction and failure tables. Input to work-set
    /// selection.
    pub fn attempt_states(&self, prompt_version: &str) -> Result<Vec<AttemptState>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT a.fingerprint, a.status, a.retry_count,
                    EXISTS (SELECT 1 FROM extractions e
                            WHERE e.fingerprint = a.fingerprint
                              AND e.prompt_version = a.prompt_version),
                    EXISTS (SELECT 1 FROM failed_extractions f
                            WHERE f.fingerprint = a.fingerprint
                              AND f.prompt_version = a.prompt_version)
             FROM extraction_attempts a
             WHERE a.prompt_version = ?",
        )?;
        let states = stmt
            .query_map(params![prompt_version], |row| {
                let status: String = row.get(1)?;
                Ok(AttemptState {
                    fingerprint: row.get(0)?,
                    status: AttemptStatus::from_str(&status).unwrap_or(AttemptStatus::Failed),
                    retry_count: row.get::<_, i64>(2)? as u32,
                    has_extraction: row.get(3)?,
                    has_failure: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }

    /// Attempt counts grouped by status for a prompt version.
    pub fn count_attempts_by_status(
        &self,
        prompt_version: &str,
    ) -> Result<Vec<(AttemptStatus, u64)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM extraction_attempts
             WHERE prompt_version = ? GROUP BY status",
        )?;
        let counts = stmt
            .query_map(params![prompt_version], |row| {
                let status: String = row.get(0)?;
                Ok((
                    AttemptStatus::from_str(&status).unwrap_or(AttemptStatus::Failed),
                    row.get::<_, i64>(1)? as u64,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}
