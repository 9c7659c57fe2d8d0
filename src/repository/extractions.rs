//! Accepted and failed extraction records.

use rusqlite::{params, Row};

use super::{parse_datetime, Result, Store};
use crate::models::{
    EnthusiasmLevel, FailedExtraction, ProjectType, StructuredExtraction,
};

fn row_to_extraction(row: &Row) -> rusqlite::Result<StructuredExtraction> {
    let themes: String = row.get(4)?;
    let use_cases: String = row.get(7)?;
    let target_audience: String = row.get(8)?;
    let technologies: String = row.get(9)?;
    let project_type: String = row.get(6)?;
    let enthusiasm: String = row.get(11)?;
    Ok(StructuredExtraction {
        id: row.get(0)?,
        narrative_id: row.get(1)?,
        fingerprint: row.get(2)?,
        prompt_version: row.get(3)?,
        themes: serde_json::from_str(&themes).unwrap_or_default(),
        theme_confidence: row.get(5)?,
        project_type: ProjectType::parse_or_other(&project_type),
        use_cases: serde_json::from_str(&use_cases).unwrap_or_default(),
        target_audience: serde_json::from_str(&target_audience).unwrap_or_default(),
        technologies: serde_json::from_str(&technologies).unwrap_or_default(),
        sentiment_score: row.get(10)?,
        enthusiasm: EnthusiasmLevel::parse_or_neutral(&enthusiasm),
        summary: row.get(12)?,
        key_innovation: row.get(13)?,
        problem_addressed: row.get(14)?,
        solution_approach: row.get(15)?,
        has_clear_problem: row.get(16)?,
        has_clear_solution: row.get(17)?,
        has_impact_metrics: row.get(18)?,
        contains_pii: row.get(19)?,
        narrative_length: row.get(20)?,
        low_confidence: row.get(21)?,
        processed_at: parse_datetime(&row.get::<_, String>(22)?),
    })
}

const EXTRACTION_COLUMNS: &str = "id, narrative_id, fingerprint, prompt_version, themes, \
     theme_confidence, project_type, use_cases, target_audience, technologies, \
     sentiment_score, enthusiasm, summary, key_innovation, problem_addressed, \
     solution_approach, has_clear_problem, has_clear_solution, has_impact_metrics, \
     contains_pii, narrative_length, low_confidence, processed_at";

impl Store {
    /// Insert an accepted extraction. One row per (fingerprint, version);
    /// duplicates are rejected by the unique constraint rather than silently
    /// overwritten.
    pub fn insert_extraction(&self, extraction: &StructuredExtraction) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO extractions
             (narrative_id, fingerprint, prompt_version, themes, theme_confidence,
              project_type, use_cases, target_audience, technologies, sentiment_score,
              enthusiasm, summary, key_innovation, problem_addressed, solution_approach,
              has_clear_problem, has_clear_solution, has_impact_metrics, contains_pii,
              narrative_length, low_confidence, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                extraction.narrative_id,
                extraction.fingerprint,
                extraction.prompt_version,
                serde_json::to_string(&extraction.themes)?,
                extraction.theme_confidence,
                extraction.project_type.as_str(),
                serde_json::to_string(&extraction.use_cases)?,
                serde_json::to_string(&extraction.target_audience)?,
                serde_json::to_string(&extraction.technologies)?,
                extraction.sentiment_score,
                extraction.enthusiasm.as_str(),
                extraction.summary,
                extraction.key_innovation,
                extraction.problem_addressed,
                extraction.solution_approach,
                extraction.has_clear_problem,
                extraction.has_clear_solution,
                extraction.has_impact_metrics,
                extraction.contains_pii,
                extraction.narrative_length,
                extraction.low_confidence,
                extraction.processed_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get the extraction for a (fingerprint, prompt version) pair.
    pub fn get_extraction(
        &self,
        fingerprint: &str,
        prompt_version: &str,
    ) -> Result<Option<StructuredExtraction>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXTRACTION_COLUMNS} FROM extractions
             WHERE fingerprint = ? AND prompt_version = ?"
        ))?;
        let mut rows = stmt.query_map(params![fingerprint, prompt_version], row_to_extraction)?;
        match rows.next() {
            Some(extraction) => Ok(Some(extraction?)),
            None => Ok(None),
        }
    }

    /// All extractions under a prompt version, ordered by processing time.
    pub fn list_extractions(&self, prompt_version: &str) -> Result<Vec<StructuredExtraction>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXTRACTION_COLUMNS} FROM extractions
             WHERE prompt_version = ? ORDER BY processed_at, id"
        ))?;
        let extractions = stmt
            .query_map(params![prompt_version], row_to_extraction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(extractions)
    }

    /// Count extractions under a prompt version, split accepted / low-confidence.
    pub fn count_extractions(&self, prompt_version: &str) -> Result<(u64, u64)> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN low_confidence = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN low_confidence = 1 THEN 1 ELSE 0 END), 0)
             FROM extractions WHERE prompt_version = ?",
            params![prompt_version],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, i64>(1)? as u64,
                ))
            },
        )
        .map_err(Into::into)
    }

    /// Record a terminal failure. First write wins; a fingerprint fails at
    /// most once per prompt version.
    ///
    /// Returns true when the failure was newly recorded.
    pub fn insert_failed_extraction(&self, failure: &FailedExtraction) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO failed_extractions
             (fingerprint, prompt_version, raw_response, error, retry_count, failed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                failure.fingerprint,
                failure.prompt_version,
                failure.raw_response,
                failure.error,
                failure.retry_count,
                failure.failed_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// All terminal failures under a prompt version, for manual triage.
    pub fn list_failed_extractions(&self, prompt_version: &str) -> Result<Vec<FailedExtraction>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, prompt_version, raw_response, error, retry_count, failed_at
             FROM failed_extractions WHERE prompt_version = ? ORDER BY failed_at",
        )?;
        let failures = stmt
            .query_map(params![prompt_version], |row| {
                Ok(FailedExtraction {
                    fingerprint: row.get(0)?,
                    prompt_version: row.get(1)?,
                    raw_response: row.get(2)?,
                    error: row.get(3)?,
                    retry_count: row.get::<_, i64>(4)? as u32,
                    failed_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(failures)
    }

    /// Count terminal failures under a prompt version.
    pub fn count_failed_extractions(&self, prompt_version: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM failed_extractions WHERE prompt_version = ?",
            params![prompt_version],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
