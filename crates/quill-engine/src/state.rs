//! Per-document render state carried between parses.

use quill_cache::GraphsCache;
use quill_renderer::Heading;

/// What one parse hands to the next.
///
/// The engine never mutates a state in place: every parse reads the previous
/// value and returns a new one.
#[derive(Debug, Default)]
pub struct RenderState {
    /// Headings of the last parse.
    pub headings: Vec<Heading>,
    /// Table of contents HTML generated from `headings`.
    pub toc_html: String,
    /// Rendered HTML of the last parse.
    pub html: String,
    /// Diagram markup keyed by content hash.
    pub graphs: GraphsCache,
}

/// Whether the table of contents must be regenerated.
///
/// Only heading text and level matter; ids follow from them.
pub(crate) fn headings_changed(previous: &[Heading], current: &[Heading]) -> bool {
    previous.len() != current.len()
        || previous
            .iter()
            .zip(current)
            .any(|(a, b)| a.content != b.content || a.level != b.level)
}
