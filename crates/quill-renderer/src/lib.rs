//! Markdown renderer for quill documents.
//!
//! Provides a generic [`MarkdownRenderer`] over pulldown-cmark events with the
//! custom rules quill documents rely on:
//!
//! - math spans (`$…$`, `$$…$$`, configurable) rendered to `MathML`, left for
//!   `MathJax`, or kept as text
//! - `[[wiki links]]`
//! - structural comments (slide boundaries, table of contents, page breaks)
//! - task list checkboxes
//! - fenced code: `math` fences, client-side diagrams, syntax highlighting
//!
//! It also hosts the pieces shared with the import and diagram stages: the
//! attribute-bag parser, typed fence options, fence tracking, heading slugs
//! and marker tokens.
//!
//! # Example
//!
//! ```
//! use quill_renderer::{HtmlBackend, MarkdownRenderer};
//!
//! let result = MarkdownRenderer::<HtmlBackend>::new().render_markdown("# Hello\n\n$x^2$");
//! assert_eq!(result.headings[0].id, "hello");
//! ```

mod attrs;
mod backend;
mod code_block;
mod fence;
mod highlight;
mod html;
pub mod markers;
mod math;
pub mod options;
mod renderer;
mod state;
mod toc;
mod wikilink;

pub use attrs::{AttributeError, Attributes, split_trailing_block};
pub use backend::RenderBackend;
pub use code_block::{CodeBlock, CodeBlockProcessor, ProcessResult};
pub use fence::{FenceTracker, OpeningFence};
pub use highlight::{highlight, normalize_language, theme_css};
pub use html::{HtmlBackend, PreviewBackend};
pub use math::{MathOptions, MathRenderer, render_math};
pub use renderer::{MarkdownRenderer, RenderOptions, RenderResult};
pub use state::{Heading, SlugTable, escape_html, inline_plain_text, slugify};
pub use toc::{toc_html, toc_markdown};
pub use wikilink::rewrite_wikilinks;
