//! Content hashes used as cache keys and artifact names.

use sha2::{Digest, Sha256};

/// Parameters that affect a rendered diagram.
#[derive(Debug, Clone, Copy)]
pub struct DiagramKey<'a> {
    /// Diagram source.
    pub source: &'a str,
    /// Kroki endpoint name, used as the language discriminator.
    pub endpoint: &'a str,
    /// Serialized fence attributes.
    pub options: &'a str,
}

impl DiagramKey<'_> {
    /// SHA-256 of `"{endpoint}:{options}:{source}"`, hex encoded.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        content_hash(&format!("{}:{}:{}", self.endpoint, self.options, self.source))
    }
}

/// Hex-encoded SHA-256 of `content`.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// First twelve hex characters of the content hash, for file names.
#[must_use]
pub fn short_hash(content: &str) -> String {
    let mut hash = content_hash(content);
    hash.truncate(12);
    hash
}
