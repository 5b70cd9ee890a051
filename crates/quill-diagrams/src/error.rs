//! Diagram rendering errors.

use std::io;
use std::time::Duration;

/// Error rendering a single diagram, code-chunk result or LaTeX document.
#[derive(Debug, thiserror::Error)]
pub enum DiagramError {
    /// External tool is not installed or not on `PATH`.
    #[error("`{tool}` could not be started: {hint}")]
    ToolMissing {
        /// Program that failed to start.
        tool: String,
        /// How to get it.
        hint: String,
    },
    /// External tool exited unsuccessfully.
    #[error("`{tool}` failed ({status}): {stderr}")]
    Failed {
        /// Program name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The persistent renderer process died and could not be restarted.
    #[error("renderer process in {dir} exited {restarts} times in a row")]
    ProcessDied {
        /// Working directory of the process.
        dir: String,
        /// Consecutive restarts attempted.
        restarts: u32,
    },
    /// No response within the configured timeout.
    #[error("no response from renderer after {0:?}")]
    Timeout(Duration),
    /// HTTP error talking to Kroki.
    #[error("HTTP error: {0}")]
    Http(String),
    /// Tool output was not what was expected.
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DiagramError {
    /// Map a spawn failure, turning "not found" into [`DiagramError::ToolMissing`].
    pub(crate) fn spawn(tool: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::ToolMissing {
                tool: tool.to_owned(),
                hint: install_hint(tool),
            }
        } else {
            Self::Io(err)
        }
    }
}

fn install_hint(tool: &str) -> String {
    let name = std::path::Path::new(tool)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(tool);
    let hint = match name {
        "java" => "a Java runtime must be installed to run PlantUML",
        "plantuml" => "PlantUML must be installed, or set `diagrams.plantuml_jar`",
        "dot" => "Graphviz must be installed (https://graphviz.org/download/)",
        "rsvg-convert" => "librsvg must be installed to rasterize SVG output",
        "pdf2svg" => "pdf2svg must be installed to convert PDF pages",
        "pdflatex" | "xelatex" | "lualatex" => "a TeX distribution must be installed",
        _ => return format!("{name} must be installed and on PATH"),
    };
    hint.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_not_found_is_tool_missing() {
        let err = DiagramError::spawn("/usr/bin/dot", io::Error::from(io::ErrorKind::NotFound));
        let DiagramError::ToolMissing { tool, hint } = &err else {
            panic!("expected ToolMissing, got {err:?}");
        };
        assert_eq!(tool, "/usr/bin/dot");
        assert!(hint.contains("Graphviz"));
    }

    #[test]
    fn test_spawn_other_error_is_io() {
        let err = DiagramError::spawn("dot", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, DiagramError::Io(_)));
    }

    #[test]
    fn test_unknown_tool_hint() {
        let err = DiagramError::spawn("frobnicate", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(
            err.to_string(),
            "`frobnicate` could not be started: frobnicate must be installed and on PATH"
        );
    }
}
