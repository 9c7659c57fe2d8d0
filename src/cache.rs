//! Durable extraction cache.
//!
//! Raw model responses are cached on disk keyed by (prompt version, content
//! fingerprint), one JSON file per entry sharded into a directory per prompt
//! version. A hit makes re-runs free: no rate-limit wait, no network call.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// On-disk cache of raw model responses.
pub struct ExtractionCache {
    root: PathBuf,
}

impl ExtractionCache {
    /// Open (creating if needed) a cache rooted at the given directory.
    pub fn new(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn entry_path(&self, fingerprint: &str, version: &str) -> PathBuf {
        self.root.join(version).join(format!("{fingerprint}.json"))
    }

    /// Look up a cached raw response.
    pub fn get(&self, fingerprint: &str, version: &str) -> Option<String> {
        let path = self.entry_path(fingerprint, version);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!("Cache hit for {} under {}", &fingerprint[..8.min(fingerprint.len())], version);
                Some(raw)
            }
            Err(_) => None,
        }
    }

    /// Store a raw response verbatim.
    pub fn put(&self, fingerprint: &str, version: &str, raw: &str) -> io::Result<()> {
        let path = self.entry_path(fingerprint, version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, raw)
    }

    /// Number of entries cached under a prompt version.
    pub fn len(&self, version: &str) -> usize {
        fs::read_dir(self.root.join(version))
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, version: &str) -> bool {
        self.len(version) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::new(dir.path()).unwrap();

        assert!(cache.get("abc123", "v2").is_none());
        cache.put("abc123", "v2", r#"{"themes":[]}"#).unwrap();
        assert_eq!(cache.get("abc123", "v2").as_deref(), Some(r#"{"themes":[]}"#));
    }

    #[test]
    fn test_versions_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::new(dir.path()).unwrap();

        cache.put("abc123", "v2", "old").unwrap();
        assert!(cache.get("abc123", "v3").is_none());
        cache.put("abc123", "v3", "new").unwrap();
        assert_eq!(cache.get("abc123", "v2").as_deref(), Some("old"));
        assert_eq!(cache.get("abc123", "v3").as_deref(), Some("new"));
        assert_eq!(cache.len("v2"), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = ExtractionCache::new(dir.path()).unwrap();
            cache.put("ff00", "v2", "payload").unwrap();
        }
        let reopened = ExtractionCache::new(dir.path()).unwrap();
        assert_eq!(reopened.get("ff00", "v2").as_deref(), Some("payload"));
    }
}
