//! Render pipeline orchestration for quill documents.
//!
//! [`Engine::parse`] runs a document through import expansion, diagram and
//! code-chunk splicing, markdown rendering, table of contents regeneration
//! and slide assembly. State that must survive between parses (headings,
//! TOC, diagram cache) lives in an immutable [`RenderState`] that each parse
//! reads and replaces. [`DocumentSession`] serializes those replacements when
//! a host runs parses concurrently.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use quill_config::Config;
//! use quill_diagrams::CodeChunks;
//! use quill_engine::{DocumentSession, Engine, ParseRequest, RenderMode};
//!
//! let config = Config::load(None, None)?;
//! let engine = Engine::from_config(&config);
//! let session = DocumentSession::new();
//!
//! let output = session.parse(
//!     &engine,
//!     &ParseRequest {
//!         text: "# Notes\n\n[TOC]\n",
//!         file_path: Path::new("notes.md"),
//!         mode: RenderMode::Preview,
//!         code_chunks: &CodeChunks::new(),
//!     },
//! )?;
//! println!("{}", output.html);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod engine;
mod error;
mod export;
mod front_matter;
mod images;
mod session;
mod slides;
mod state;

pub use engine::{Engine, EngineOptions, ParseOutput, ParseRequest, RenderMode};
pub use error::EngineError;
pub use export::{standalone_document, write_document};
pub use session::{DocumentSession, ParseTicket, SessionPhase};
pub use state::RenderState;
