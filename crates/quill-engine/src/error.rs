//! Engine errors.

use std::path::PathBuf;

use quill_diagrams::DiagramError;

/// Error that aborts a parse.
///
/// Everything else (failed imports, diagrams, chunk correlation) is reported
/// inline and as a warning.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The image output directory could not be created.
    #[error("cannot create image directory {}: {source}", path.display())]
    ImageDirectory {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// An output file could not be written.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The diagram stage failed as a whole.
    #[error(transparent)]
    Diagram(#[from] DiagramError),
}
