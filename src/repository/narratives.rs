//! Local read view of the narrative feed.

use rusqlite::{params, Row};

use super::{parse_datetime, parse_datetime_opt, Result, Store};
use crate::models::Narrative;

fn row_to_narrative(row: &Row) -> rusqlite::Result<Narrative> {
    let technologies: String = row.get(3)?;
    Ok(Narrative {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        technologies: serde_json::from_str(&technologies).unwrap_or_default(),
        event: row.get(4)?,
        submitted_at: parse_datetime_opt(row.get(5)?),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const NARRATIVE_COLUMNS: &str = "id, title, text, technologies, event, submitted_at, created_at";

impl Store {
    /// Insert a narrative if unseen. Narratives are immutable once observed,
    /// so re-imports of the same external id are ignored.
    ///
    /// Returns true when the narrative was newly inserted.
    pub fn insert_narrative(&self, narrative: &Narrative) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO narratives
             (id, title, text, technologies, event, submitted_at, fingerprint, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                narrative.id,
                narrative.title,
                narrative.text,
                serde_json::to_string(&narrative.technologies)?,
                narrative.event,
                narrative.submitted_at.map(|dt| dt.to_rfc3339()),
                narrative.content_fingerprint(),
                narrative.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Load every narrative, ordered by external id for stable iteration.
    pub fn list_narratives(&self) -> Result<Vec<Narrative>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NARRATIVE_COLUMNS} FROM narratives ORDER BY id"
        ))?;
        let narratives = stmt
            .query_map([], row_to_narrative)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(narratives)
    }

    /// Get a single narrative by external id.
    pub fn get_narrative(&self, id: &str) -> Result<Option<Narrative>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NARRATIVE_COLUMNS} FROM narratives WHERE id = ?"
        ))?;
        let mut rows = stmt.query_map(params![id], row_to_narrative)?;
        match rows.next() {
            Some(narrative) => Ok(Some(narrative?)),
            None => Ok(None),
        }
    }

    /// External ids of every narrative sharing a fingerprint.
    ///
    /// Deduplicated extraction work joins back to individual submissions here.
    pub fn narrative_ids_for_fingerprint(&self, fingerprint: &str) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT id FROM narratives WHERE fingerprint = ? ORDER BY id")?;
        let ids = stmt
            .query_map(params![fingerprint], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Count stored narratives.
    pub fn count_narratives(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM narratives", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn narrative(id: &str, text: &str) -> Narrative {
        Narrative {
            id: id.to_string(),
            title: format!("Project {id}"),
            text: text.to_string(),
            technologies: vec!["rust".to_string()],
            event: Some("Test Hack".to_string()),
            submitted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let (_dir, store) = test_store();
        let n = narrative("s1", "a narrative long enough to matter");
        assert!(store.insert_narrative(&n).unwrap());
        assert!(!store.insert_narrative(&n).unwrap());
        assert_eq!(store.count_narratives().unwrap(), 1);
    }

    #[test]
    fn test_fingerprint_join() {
        let (_dir, store) = test_store();
        let text = "two submissions with identical narrative text";
        store.insert_narrative(&narrative("s1", text)).unwrap();
        store.insert_narrative(&narrative("s2", text)).unwrap();
        store
            .insert_narrative(&narrative("s3", "a different narrative entirely"))
            .unwrap();

        let ids = store
            .narrative_ids_for_fingerprint(&Narrative::fingerprint(text))
            .unwrap();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let (_dir, store) = test_store();
        let n = narrative("s9", "some text for the round trip check");
        store.insert_narrative(&n).unwrap();

        let loaded = store.get_narrative("s9").unwrap().unwrap();
        assert_eq!(loaded.title, "Project s9");
        assert_eq!(loaded.technologies, vec!["rust"]);
        assert_eq!(loaded.event.as_deref(), Some("Test Hack"));
    }
}
