//! Import errors.

use std::io;

use quill_diagrams::DiagramError;
use quill_renderer::AttributeError;

/// Error resolving a single import.
///
/// Import errors never abort a transform; each one becomes an inline error
/// fragment at the position of the failing directive.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Local file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),
    /// Local file could not be read.
    #[error("failed to read {location}: {source}")]
    Io {
        /// Resolved location.
        location: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Remote import could not be fetched.
    #[error("failed to fetch {url}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Transport or status description.
        message: String,
    },
    /// The directive's attribute block is malformed.
    #[error("invalid import options: {0}")]
    Options(#[from] AttributeError),
    /// The file imports itself, directly or through other files.
    #[error("circular import of {0}")]
    Cycle(String),
    /// Imports are nested too deeply.
    #[error("imports nested deeper than {0} levels")]
    TooDeep(usize),
    /// Stylesheet failed to compile.
    #[error("failed to compile {location}: {message}")]
    Stylesheet {
        /// Resolved location.
        location: String,
        /// Compiler message.
        message: String,
    },
    /// The import kind cannot be handled for this location.
    #[error("{0}")]
    Unsupported(String),
    /// PDF conversion failed.
    #[error(transparent)]
    Pdf(#[from] DiagramError),
}

impl ImportError {
    /// Map a read failure for `location`.
    pub(crate) fn read(location: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(location.to_owned())
        } else {
            Self::Io {
                location: location.to_owned(),
                source,
            }
        }
    }
}
