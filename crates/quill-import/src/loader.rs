//! Loading import content.
//!
//! [`FileLoader`] is the seam between the transformer and the outside world.
//! Locations are either filesystem paths or `http(s)` URLs, already resolved
//! against the importing file.

use std::collections::HashMap;
use std::fs;
use std::sync::RwLock;
use std::time::Duration;

use ureq::Agent;

use crate::error::ImportError;

/// Loads the text of an import location.
pub trait FileLoader: Send + Sync {
    /// Load the content at `location`.
    fn load(&self, location: &str) -> Result<String, ImportError>;
}

/// Reads local files and fetches `http(s)` URLs.
#[derive(Debug, Clone)]
pub struct DefaultLoader {
    agent: Agent,
}

impl Default for DefaultLoader {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl DefaultLoader {
    /// Create a loader whose HTTP requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: Agent::config_builder()
                .timeout_global(Some(timeout))
                .http_status_as_error(false)
                .build()
                .into(),
        }
    }

    fn fetch(&self, url: &str) -> Result<String, ImportError> {
        let http = |message: String| ImportError::Http {
            url: url.to_owned(),
            message,
        };
        let response = self.agent.get(url).call().map_err(|e| http(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(http(format!("HTTP {status}")));
        }
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| http(e.to_string()))?;
        tracing::debug!(url, bytes = body.len(), "Fetched remote import");
        Ok(body)
    }
}

impl FileLoader for DefaultLoader {
    fn load(&self, location: &str) -> Result<String, ImportError> {
        if is_remote(location) {
            return self.fetch(location);
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        fs::read_to_string(path).map_err(|e| ImportError::read(location, e))
    }
}

/// Whether a location is fetched over HTTP.
#[must_use]
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// In-memory loader for tests and embedding hosts.
///
/// # Example
///
/// ```
/// use quill_import::{FileLoader, MemoryLoader};
///
/// let loader = MemoryLoader::new().with_file("/docs/a.md", "# A");
/// assert_eq!(loader.load("/docs/a.md").unwrap(), "# A");
/// assert!(loader.load("/docs/b.md").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: RwLock<HashMap<String, String>>,
    loads: RwLock<Vec<String>>,
}

impl MemoryLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder pattern).
    #[must_use]
    pub fn with_file(self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(location, content);
        self
    }

    /// Add or replace a file.
    pub fn insert(&self, location: impl Into<String>, content: impl Into<String>) {
        self.files
            .write()
            .unwrap()
            .insert(location.into(), content.into());
    }

    /// Locations loaded so far, in order.
    #[must_use]
    pub fn loads(&self) -> Vec<String> {
        self.loads.read().unwrap().clone()
    }
}

impl FileLoader for MemoryLoader {
    fn load(&self, location: &str) -> Result<String, ImportError> {
        self.loads.write().unwrap().push(location.to_owned());
        self.files
            .read()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(location.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "# A").unwrap();

        let loader = DefaultLoader::default();
        assert_eq!(loader.load(path.to_str().unwrap()).unwrap(), "# A");
    }

    #[test]
    fn test_default_loader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md");

        let err = DefaultLoader::default()
            .load(path.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }

    #[test]
    fn test_unreachable_url() {
        let err = DefaultLoader::new(Duration::from_secs(2))
            .load("http://127.0.0.1:9/a.md")
            .unwrap_err();
        assert!(matches!(err, ImportError::Http { .. }));
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/a.md"));
        assert!(!is_remote("/docs/https.md"));
    }

    #[test]
    fn test_memory_loader_records_loads() {
        let loader = MemoryLoader::new().with_file("a", "1");
        loader.load("a").unwrap();
        loader.load("b").unwrap_err();
        assert_eq!(loader.loads(), ["a", "b"]);
    }
}
