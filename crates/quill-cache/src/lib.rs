//! Caches shared by the quill pipeline stages.
//!
//! Two caches live here:
//!
//! - [`FilesCache`]: resolved import location to loaded content, scoped to a
//!   single top-level transform so repeated imports of the same file are read
//!   once.
//! - [`GraphsCache`]: diagram content hash to rendered markup. A cache is
//!   immutable once built; each pass reads the previous generation through a
//!   [`GraphsCacheBuilder`] and produces the next one, so entries that were not
//!   used during the pass are evicted.
//!
//! # Example
//!
//! ```
//! use quill_cache::GraphsCache;
//!
//! let previous = GraphsCache::default();
//! let mut builder = previous.builder();
//! assert_eq!(builder.lookup("abc"), None);
//! builder.insert("abc", "<svg></svg>");
//!
//! let next = builder.finish();
//! assert_eq!(next.get("abc"), Some("<svg></svg>"));
//! ```

mod files;
mod graphs;

pub use files::FilesCache;
pub use graphs::{GraphsCache, GraphsCacheBuilder, PersistError};
