//! Prompt version management.
//!
//! Exactly one version is active at a time. Activation flips the flag inside
//! a transaction so there is never a window with zero or two active versions.

use rusqlite::{params, Row};

use super::{parse_datetime, RepositoryError, Result, Store};
use crate::models::PromptVersion;

fn row_to_prompt(row: &Row) -> rusqlite::Result<PromptVersion> {
    Ok(PromptVersion {
        version: row.get(0)?,
        instruction: row.get(1)?,
        temperature: row.get(2)?,
        max_tokens: row.get::<_, i64>(3)? as u32,
        active: row.get::<_, i64>(4)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

const PROMPT_COLUMNS: &str = "version, instruction, temperature, max_tokens, active, created_at";

impl Store {
    /// Register a prompt version. Existing versions are immutable; a second
    /// insert under the same name is ignored.
    pub fn insert_prompt_version(&self, prompt: &PromptVersion) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO prompt_versions
             (version, instruction, temperature, max_tokens, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                prompt.version,
                prompt.instruction,
                prompt.temperature,
                prompt.max_tokens,
                prompt.active as i64,
                prompt.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// The currently active prompt version.
    pub fn active_prompt(&self) -> Result<Option<PromptVersion>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompt_versions WHERE active = 1 LIMIT 1"
        ))?;
        let mut rows = stmt.query_map([], row_to_prompt)?;
        match rows.next() {
            Some(prompt) => Ok(Some(prompt?)),
            None => Ok(None),
        }
    }

    /// The active prompt version, as a hard requirement.
    ///
    /// Missing active version is a configuration error: fatal at run start.
    pub fn require_active_prompt(&self) -> Result<PromptVersion> {
        self.active_prompt()?.ok_or(RepositoryError::NoActivePrompt)
    }

    /// Make the named version the single active one.
    pub fn activate_prompt(&self, version: &str) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE prompt_versions SET active = 1 WHERE version = ?",
            params![version],
        )?;
        if updated == 0 {
            return Err(RepositoryError::UnknownPromptVersion(version.to_string()));
        }
        tx.execute(
            "UPDATE prompt_versions SET active = 0 WHERE version != ?",
            params![version],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// List all prompt versions, newest first.
    pub fn list_prompt_versions(&self) -> Result<Vec<PromptVersion>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompt_versions ORDER BY created_at DESC"
        ))?;
        let prompts = stmt
            .query_map([], row_to_prompt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(prompts)
    }
}
