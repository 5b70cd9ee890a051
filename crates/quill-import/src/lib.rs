//! Import expansion for quill documents.
//!
//! The [`ImportTransformer`] is the first stage of the pipeline. It rewrites
//! author markdown into an intermediate stream:
//! - `@import "file" {options}` is replaced by the file's content, dispatched on
//!   extension (markdown, images, CSV, stylesheets, scripts, HTML, PDF,
//!   diagram sources, code)
//! - headings are collected with document-unique ids
//! - front matter, slides, page breaks, `[TOC]` and task items are normalized
//!
//! Content is read through a [`FileLoader`]; [`DefaultLoader`] reads local
//! files and fetches `http(s)` URLs, [`MemoryLoader`] serves tests.

mod csv;
mod error;
mod front_matter;
mod import;
mod loader;
mod transformer;

pub use csv::csv_to_markdown;
pub use error::ImportError;
pub use front_matter::FrontMatter;
pub use loader::{DefaultLoader, FileLoader, MemoryLoader, is_remote};
pub use transformer::{
    ImportTransformer, MAX_IMPORT_DEPTH, SlideConfig, TransformOptions, TransformOutput,
};
