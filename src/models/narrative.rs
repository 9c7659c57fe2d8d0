//! Narrative models and content fingerprinting.
//!
//! Narratives are deduplicated by a content-addressed fingerprint so that
//! identical submission text is only ever extracted once per prompt version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A free-text project narrative with its submission metadata.
///
/// Owned by the external narrative feed; immutable once observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    /// Stable external key (submission identifier).
    pub id: String,
    /// Project title.
    pub title: String,
    /// The free-text narrative itself.
    pub text: String,
    /// Technologies the submitter declared (outside the narrative).
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Event or challenge the submission belongs to.
    #[serde(default)]
    pub event: Option<String>,
    /// When the project was submitted.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// When this narrative was first seen by us.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Narrative {
    /// Compute the content fingerprint: SHA-256 of the normalized text.
    ///
    /// Normalization trims the text and collapses internal whitespace runs,
    /// so formatting-only differences map to the same fingerprint.
    pub fn fingerprint(text: &str) -> String {
        let normalized = normalize_text(text);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fingerprint of this narrative's text.
    pub fn content_fingerprint(&self) -> String {
        Self::fingerprint(&self.text)
    }

    /// Trimmed text if it meets the minimum length for extraction.
    ///
    /// Narratives below the minimum are skipped, not retried.
    pub fn eligible_text(&self, min_chars: usize) -> Option<&str> {
        let trimmed = self.text.trim();
        if trimmed.chars().count() >= min_chars {
            Some(trimmed)
        } else {
            None
        }
    }
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
