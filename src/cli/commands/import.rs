//! The import command: load narratives from an NDJSON feed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use console::style;
use tracing::warn;

use crate::config::Settings;
use crate::models::Narrative;

use super::open_store;

/// Import narratives, one JSON object per line. Re-imports are idempotent:
/// already-seen external ids are skipped.
pub fn cmd_import(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let reader = BufReader::new(File::open(file)?);

    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut malformed = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Narrative>(&line) {
            Ok(narrative) => {
                if store.insert_narrative(&narrative)? {
                    imported += 1;
                } else {
                    skipped += 1;
                }
            }
            Err(e) => {
                warn!("Skipping malformed feed line {}: {}", line_no + 1, e);
                malformed += 1;
            }
        }
    }

    println!(
        "{} Imported {} narratives ({} already known, {} malformed lines)",
        style("✓").green(),
        imported,
        skipped,
        malformed
    );
    Ok(())
}
