//! Standalone HTML documents for export.

use std::fs;
use std::path::Path;

use quill_renderer::escape_html;

use crate::error::EngineError;

/// Base stylesheet for exported documents.
const BASE_CSS: &str = "\
body { max-width: 960px; margin: 0 auto; padding: 2em; font-family: sans-serif; line-height: 1.6; }
pre { overflow: auto; padding: 1em; }
figure.diagram { margin: 1em 0; }
.pagebreak { page-break-after: always; }
.quill-error { white-space: pre-wrap; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ddd; padding: 0.3em 0.6em; }
";

/// Wrap rendered HTML in a complete document.
///
/// `theme_css` is the syntax highlighting stylesheet; `head` is appended to
/// the `<head>` element verbatim.
#[must_use]
pub fn standalone_document(html: &str, title: &str, theme_css: Option<&str>, head: &str) -> String {
    let mut doc = String::with_capacity(html.len() + BASE_CSS.len() + 256);
    doc.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    doc.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    doc.push_str("<title>");
    doc.push_str(&escape_html(title));
    doc.push_str("</title>\n<style>\n");
    doc.push_str(BASE_CSS);
    if let Some(css) = theme_css {
        doc.push_str(css);
        if !css.ends_with('\n') {
            doc.push('\n');
        }
    }
    doc.push_str("</style>\n");
    doc.push_str(head);
    doc.push_str("</head>\n<body>\n");
    doc.push_str(html);
    if !html.ends_with('\n') {
        doc.push('\n');
    }
    doc.push_str("</body>\n</html>\n");
    doc
}

/// Write an exported document, creating parent directories.
pub fn write_document(path: &Path, contents: &str) -> Result<(), EngineError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    };
    write().map_err(|source| EngineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Wrote document");
    Ok(())
}
