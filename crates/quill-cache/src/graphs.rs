//! Generational diagram markup cache.
//!
//! A [`GraphsCache`] is an immutable snapshot mapping a diagram content hash to
//! the markup produced for it. A rendering pass reads the previous snapshot
//! through a [`GraphsCacheBuilder`], which records every hash the pass touches
//! and produces the next snapshot with [`GraphsCacheBuilder::finish`]. Hashes
//! the pass did not touch are not carried over.
//!
//! Snapshots can be persisted to a JSON file so command-line runs reuse
//! diagrams across invocations. The file carries a version string; a version
//! mismatch is treated as an empty cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Immutable diagram markup cache for one rendering generation.
///
/// Cloning is cheap: entries are shared behind an [`Arc`].
#[derive(Clone, Debug, Default)]
pub struct GraphsCache {
    entries: Arc<HashMap<String, String>>,
}

impl GraphsCache {
    /// Get markup for a content hash.
    pub fn get(&self, hash: &str) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    /// Whether the cache holds markup for a content hash.
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of cached diagrams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start building the next generation from this one.
    #[must_use]
    pub fn builder(&self) -> GraphsCacheBuilder<'_> {
        GraphsCacheBuilder {
            previous: self,
            next: HashMap::new(),
            hits: 0,
        }
    }

    /// Load a persisted cache.
    ///
    /// A missing file, a version mismatch, or unreadable content all yield an
    /// empty cache; persisted diagrams are an optimisation only.
    #[must_use]
    pub fn load(path: &Path, version: &str) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<PersistedGraphs>(&content) {
            Ok(persisted) if persisted.version == version => {
                tracing::debug!(entries = persisted.entries.len(), "Loaded graphs cache");
                Self {
                    entries: Arc::new(persisted.entries),
                }
            }
            Ok(persisted) => {
                tracing::info!(
                    stored = %persisted.version,
                    current = %version,
                    "Graphs cache version changed, starting empty"
                );
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt graphs cache");
                Self::default()
            }
        }
    }

    /// Persist the cache to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path, version: &str) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let persisted = PersistedGraphsRef {
            version,
            entries: &self.entries,
        };
        let json = serde_json::to_vec(&persisted)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl FromIterator<(String, String)> for GraphsCache {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// Collects the entries used during one pass.
///
/// Reads fall through to the previous generation; a hit is copied forward so
/// the entry survives into the next generation.
#[derive(Debug)]
pub struct GraphsCacheBuilder<'a> {
    previous: &'a GraphsCache,
    next: HashMap<String, String>,
    hits: usize,
}

impl GraphsCacheBuilder<'_> {
    /// Look up markup for a hash, carrying a hit forward into the next generation.
    pub fn lookup(&mut self, hash: &str) -> Option<String> {
        if let Some(markup) = self.next.get(hash) {
            return Some(markup.clone());
        }
        let markup = self.previous.get(hash)?.to_owned();
        self.next.insert(hash.to_owned(), markup.clone());
        self.hits += 1;
        Some(markup)
    }

    /// Record freshly rendered markup.
    pub fn insert(&mut self, hash: impl Into<String>, markup: impl Into<String>) {
        self.next.insert(hash.into(), markup.into());
    }

    /// Number of lookups answered by the previous generation.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Seal the next generation.
    #[must_use]
    pub fn finish(self) -> GraphsCache {
        tracing::debug!(
            entries = self.next.len(),
            hits = self.hits,
            evicted = self.previous.len().saturating_sub(self.hits),
            "Graphs cache generation complete"
        );
        GraphsCache {
            entries: Arc::new(self.next),
        }
    }
}

/// Error persisting a graphs cache.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// I/O error writing the cache file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct PersistedGraphs {
    version: String,
    entries: HashMap<String, String>,
}

#[derive(Serialize)]
struct PersistedGraphsRef<'a> {
    version: &'a str,
    entries: &'a HashMap<String, String>,
}
