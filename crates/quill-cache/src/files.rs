//! Import content cache.

use std::collections::HashMap;

/// Loaded import content keyed by resolved location.
///
/// Keys are the resolved file path or URL string. A fresh cache is created for
/// every top-level transform and shared with nested imports, so a file imported
/// twice is read once per pass.
#[derive(Debug, Default)]
pub struct FilesCache {
    entries: HashMap<String, String>,
}

impl FilesCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get cached content for a location.
    pub fn get(&self, location: &str) -> Option<&str> {
        self.entries.get(location).map(String::as_str)
    }

    /// Store content for a location, replacing any previous entry.
    pub fn insert(&mut self, location: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(location.into(), content.into());
    }

    /// Drop every entry whose location ends with `extension` (e.g. `".pdf"`).
    ///
    /// Export routines call this before regenerating artifacts whose output
    /// files are rewritten in place.
    pub fn invalidate_extension(&mut self, extension: &str) -> usize {
        let extension = extension.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries
            .retain(|location, _| !location.to_ascii_lowercase().ends_with(&extension));
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, extension = %extension, "Invalidated cached imports");
        }
        removed
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
