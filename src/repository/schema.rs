//! Database schema initialization.

use super::{Result, Store};

impl Store {
    /// Initialize the database schema.
    pub(crate) fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS narratives (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                text TEXT NOT NULL,
                technologies TEXT NOT NULL DEFAULT '[]',
                event TEXT,
                submitted_at TEXT,
                fingerprint TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prompt_versions (
                version TEXT PRIMARY KEY,
                instruction TEXT NOT NULL,
                temperature REAL NOT NULL,
                max_tokens INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS extraction_attempts (
                fingerprint TEXT NOT NULL,
                prompt_version TEXT NOT NULL,
                model TEXT NOT NULL,
                raw_response TEXT,
                status TEXT NOT NULL,
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (fingerprint, prompt_version)
            );

            CREATE TABLE IF NOT EXISTS extractions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                narrative_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                prompt_version TEXT NOT NULL,
                themes TEXT NOT NULL,
                theme_confidence REAL NOT NULL,
                project_type TEXT NOT NULL,
                use_cases TEXT NOT NULL,
                target_audience TEXT NOT NULL,
                technologies TEXT NOT NULL,
                sentiment_score REAL NOT NULL,
                enthusiasm TEXT NOT NULL,
                summary TEXT NOT NULL,
                key_innovation TEXT NOT NULL,
                problem_addressed TEXT NOT NULL,
                solution_approach TEXT NOT NULL,
                has_clear_problem INTEGER NOT NULL,
                has_clear_solution INTEGER NOT NULL,
                has_impact_metrics INTEGER NOT NULL,
                contains_pii INTEGER NOT NULL,
                narrative_length INTEGER NOT NULL,
                low_confidence INTEGER NOT NULL,
                processed_at TEXT NOT NULL,
                UNIQUE (fingerprint, prompt_version),
                FOREIGN KEY (narrative_id) REFERENCES narratives(id)
            );

            CREATE TABLE IF NOT EXISTS failed_extractions (
                fingerprint TEXT NOT NULL,
                prompt_version TEXT NOT NULL,
                raw_response TEXT,
                error TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                failed_at TEXT NOT NULL,
                PRIMARY KEY (fingerprint, prompt_version)
            );

            CREATE INDEX IF NOT EXISTS idx_narratives_fingerprint
                ON narratives(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_attempts_status
                ON extraction_attempts(prompt_version, status);
            CREATE INDEX IF NOT EXISTS idx_extractions_version
                ON extractions(prompt_version);
            CREATE INDEX IF NOT EXISTS idx_extractions_confidence
                ON extractions(theme_confidence);
            CREATE INDEX IF NOT EXISTS idx_extractions_processed
                ON extractions(processed_at);
        "#,
        )?;
        Ok(())
    }
}
