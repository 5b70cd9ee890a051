//! Code-chunk execution results.
//!
//! An external executor maintains one [`CodeChunkData`] node per executable
//! fence, chained through `prev`/`next` ids in document order. The processor
//! only reads the list.

use std::collections::{HashMap, HashSet};

use quill_renderer::Attributes;
use serde::{Deserialize, Serialize};

/// One code chunk and its last result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeChunkData {
    /// Chunk id.
    pub id: String,
    /// Source code.
    pub code: String,
    /// Fence attributes at execution time.
    pub options: Attributes,
    /// Output of the last run.
    pub result: String,
    /// Whether a run is in progress.
    pub running: bool,
    /// Id of the previous chunk.
    pub prev: Option<String>,
    /// Id of the next chunk.
    pub next: Option<String>,
}

/// Code chunks keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeChunks {
    chunks: HashMap<String, CodeChunkData>,
}

impl CodeChunks {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `id → chunk`, or a JSON array of chunks.
    ///
    /// An array without `prev`/`next` links is taken in document order.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.is_array() {
            let list: Vec<CodeChunkData> = serde_json::from_value(value)?;
            if list.iter().all(|c| c.prev.is_none() && c.next.is_none()) {
                return Ok(Self::linked(list));
            }
            return Ok(list.into_iter().collect());
        }
        serde_json::from_value(value)
    }

    /// Build a list from chunks in document order, linking them.
    #[must_use]
    pub fn linked(chunks: Vec<CodeChunkData>) -> Self {
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, mut chunk)| {
                chunk.prev = i.checked_sub(1).map(|p| ids[p].clone());
                chunk.next = ids.get(i + 1).cloned();
                chunk
            })
            .collect()
    }

    /// Add or replace a chunk.
    pub fn insert(&mut self, chunk: CodeChunkData) {
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    /// Get a chunk by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CodeChunkData> {
        self.chunks.get(id)
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The chunk with no `prev`.
    ///
    /// With several candidates the smallest id wins, keeping the walk
    /// deterministic.
    #[must_use]
    pub fn head(&self) -> Option<&CodeChunkData> {
        self.chunks
            .values()
            .filter(|c| c.prev.as_deref().is_none_or(str::is_empty))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Walk from the head following `next`.
    #[must_use]
    pub fn walk(&self) -> ChunkWalk<'_> {
        ChunkWalk {
            chunks: self,
            next: self.head(),
            visited: HashSet::new(),
        }
    }
}

impl FromIterator<CodeChunkData> for CodeChunks {
    fn from_iter<T: IntoIterator<Item = CodeChunkData>>(iter: T) -> Self {
        Self {
            chunks: iter.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

/// Iterator over chunks in linked order.
///
/// Stops at a dangling `next` or when a node repeats.
#[derive(Debug)]
pub struct ChunkWalk<'a> {
    chunks: &'a CodeChunks,
    next: Option<&'a CodeChunkData>,
    visited: HashSet<&'a str>,
}

impl<'a> Iterator for ChunkWalk<'a> {
    type Item = &'a CodeChunkData;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if !self.visited.insert(current.id.as_str()) {
            tracing::warn!(id = %current.id, "Code chunk list has a cycle");
            return None;
        }
        self.next = current
            .next
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| self.chunks.get(id));
        Some(current)
    }
}
