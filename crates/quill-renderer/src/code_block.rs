//! Code block processor trait for extensible fence handling.
//!
//! Processors are registered with the renderer and consulted in order when a
//! fenced block closes. The first processor returning something other than
//! [`ProcessResult::PassThrough`] wins; otherwise the built-in fence rule
//! renders the block.

use crate::attrs::Attributes;
use crate::fence::OpeningFence;

/// Result of processing a code block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Replace the block with a placeholder resolved in `post_process`.
    Placeholder(String),
    /// Replace the block with HTML.
    Inline(String),
    /// Not handled by this processor.
    PassThrough,
}

/// A fenced block handed to a processor.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeBlock<'a> {
    /// Zero-based index of the block in the document.
    pub index: usize,
    /// Language token (may be empty).
    pub language: &'a str,
    /// Parsed attribute bag.
    pub attrs: &'a Attributes,
    /// Block content.
    pub source: &'a str,
}

/// Trait for processing special code blocks.
pub trait CodeBlockProcessor {
    /// Process a code block.
    fn process(&mut self, block: &CodeBlock<'_>) -> ProcessResult;

    /// Replace placeholders in the rendered HTML.
    ///
    /// Called once after rendering. Default is a no-op.
    fn post_process(&mut self, _html: &mut String) {}

    /// Warnings collected while processing.
    fn warnings(&self) -> &[String] {
        &[]
    }
}

/// Split a fence info string into language and attributes.
///
/// A malformed attribute block yields an empty bag plus the error message.
pub(crate) fn parse_fence_info(info: &str) -> (String, Attributes, Option<String>) {
    let line = format!("```{info}");
    let Some(fence) = OpeningFence::parse(&line) else {
        return (String::new(), Attributes::new(), None);
    };
    let language = fence.language().to_owned();
    let rest = fence.rest();
    if rest.is_empty() {
        return (language, Attributes::new(), None);
    }
    match Attributes::parse(rest) {
        Ok(attrs) => (language, attrs, None),
        Err(e) => (language, Attributes::new(), Some(e.to_string())),
    }
}
