//! Diagram rendering and code-chunk splicing for quill.
//!
//! This crate turns the expanded markdown of a document into markdown ready
//! for the renderer:
//! - `PlantUML` through a pool of persistent processes, one per working directory
//! - Graphviz through `dot`, other grammars through a Kroki server
//! - a content-addressed graphs cache carried between passes
//! - execution results of code chunks spliced in after their fences
//! - LaTeX chunks and PDF files converted to SVG pages
//!
//! Grammars the browser renders itself (Mermaid, `WaveDrom`, Vega) pass through
//! untouched.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use quill_cache::GraphsCache;
//! use quill_diagrams::{CodeChunks, DiagramOutput, DiagramProcessor, ProcessOptions};
//! use quill_renderer::options::TocOptions;
//!
//! let processor = DiagramProcessor::new();
//! let graphs = GraphsCache::default();
//! let chunks = CodeChunks::new();
//! let options = ProcessOptions {
//!     working_directory: Path::new("."),
//!     image_directory_path: Path::new("assets"),
//!     image_link_base: "/assets",
//!     image_file_prefix: "",
//!     code_chunks: &chunks,
//!     graphs: &graphs,
//!     headings: &[],
//!     toc: TocOptions::default(),
//!     toc_indent: "  ",
//!     output: DiagramOutput::Inline,
//! };
//! let out = processor
//!     .process("```puml\nA -> B\n```\n", &options)
//!     .unwrap();
//! println!("{}", out.output);
//! ```

mod cache;
mod chunks;
mod error;
mod kroki;
mod language;
mod latex;
mod plantuml;
mod pool;
mod processor;
mod tool;

pub use cache::{DiagramKey, content_hash, short_hash};
pub use chunks::{ChunkWalk, CodeChunkData, CodeChunks};
pub use error::DiagramError;
pub use kroki::KrokiClient;
pub use language::{DiagramFormat, DiagramLanguage, RenderRoute};
pub use latex::{LatexChain, page_images_markdown};
pub use plantuml::{PlantUmlCommand, TaskCommand, prepare_source};
pub use pool::{DiagramTaskPool, SvgStreamSplitter};
pub use processor::{DiagramOutput, DiagramProcessor, ProcessOptions, ProcessOutput};
pub use tool::{render_dot, svg_to_png};
