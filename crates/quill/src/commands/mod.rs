//! CLI command implementations.

mod document;
pub(crate) mod export;
pub(crate) mod render;
pub(crate) mod toc;

pub(crate) use export::ExportArgs;
pub(crate) use render::RenderArgs;
pub(crate) use toc::TocArgs;
