//! Content-addressed embedding cache.
//!
//! Maps the SHA-256 of an exact text to its embedding vector, one JSON
//! file per hash under the cache directory. Lookups never fail: an
//! unreadable or corrupt entry is simply a miss. Writes overwrite
//! unconditionally; identical text always produces the identical key, so
//! concurrent writes to the same key are idempotent.
//!
//! There is no eviction, expiry, or size bound; entries persist until
//! removed externally.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// The cache key for a text: SHA-256 hex of its exact bytes.
    pub fn cache_key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// The cached vector for `text`, or `None` on a miss. Never errors.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let path = self.entry_path(&Self::cache_key(text));
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Persist `vector` under the text's key, overwriting any prior entry.
    pub fn set(&self, text: &str, vector: &[f32]) -> Result<()> {
        let path = self.entry_path(&Self::cache_key(text));
        let raw = serde_json::to_string(vector)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Number of entries currently on disk.
    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, EmbeddingCache) {
        let tmp = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::new(tmp.path()).unwrap();
        (tmp, cache)
    }

    #[test]
    fn get_after_set_returns_exact_vector() {
        let (_tmp, cache) = cache();
        let vector = vec![0.25f32, -1.5, 3.0];
        cache.set("some text", &vector).unwrap();
        assert_eq!(cache.get("some text"), Some(vector));
    }

    #[test]
    fn miss_returns_none() {
        let (_tmp, cache) = cache();
        assert_eq!(cache.get("never stored"), None);
    }

    #[test]
    fn identical_text_identical_key() {
        assert_eq!(
            EmbeddingCache::cache_key("same"),
            EmbeddingCache::cache_key("same")
        );
        assert_ne!(
            EmbeddingCache::cache_key("same"),
            EmbeddingCache::cache_key("same "),
        );
    }

    #[test]
    fn set_overwrites() {
        let (_tmp, cache) = cache();
        cache.set("text", &[1.0]).unwrap();
        cache.set("text", &[2.0]).unwrap();
        assert_eq!(cache.get("text"), Some(vec![2.0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let (tmp, cache) = cache();
        let key = EmbeddingCache::cache_key("text");
        std::fs::write(tmp.path().join(format!("{}.json", key)), "not json").unwrap();
        assert_eq!(cache.get("text"), None);
    }
}
