//! LaTeX → PDF → SVG conversion.
//!
//! Sources are compiled in a scratch directory; each PDF page becomes
//! `{prefix}{hash}-{page}.svg` in the image directory, where `hash` is derived
//! from the source so concurrent conversions never collide.

use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use quill_renderer::markers::image_markdown;

use crate::cache::short_hash;
use crate::error::DiagramError;
use crate::tool::run_tool;

/// TeX engine and PDF converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatexChain {
    engine: String,
    pdf2svg: String,
}

impl Default for LatexChain {
    fn default() -> Self {
        Self::new("pdflatex", "pdf2svg")
    }
}

impl LatexChain {
    /// Use the given TeX engine and `pdf2svg` executable.
    #[must_use]
    pub fn new(engine: impl Into<String>, pdf2svg: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            pdf2svg: pdf2svg.into(),
        }
    }

    /// Compile `source` and write one SVG per page into `image_dir`.
    ///
    /// On failure every artifact sharing the output stem is removed and the
    /// engine's diagnostics are returned.
    pub fn compile_to_svgs(
        &self,
        source: &str,
        image_dir: &Path,
        prefix: &str,
    ) -> Result<Vec<PathBuf>, DiagramError> {
        let stem = format!("{prefix}{}", short_hash(source));
        let scratch = tempfile::tempdir()?;
        let tex_path = scratch.path().join(format!("{stem}.tex"));
        fs::write(&tex_path, source)?;

        let tex_name = format!("{stem}.tex");
        let compiled = run_tool(
            &self.engine,
            &["-interaction=nonstopmode", "-halt-on-error", &tex_name],
            b"",
            Some(scratch.path()),
        );
        if let Err(e) = compiled {
            scrub(image_dir, &stem);
            return Err(tex_failure(e, &scratch.path().join(format!("{stem}.log"))));
        }

        let pdf_path = scratch.path().join(format!("{stem}.pdf"));
        self.pdf_pages_to_svgs(&pdf_path, image_dir, &stem)
    }

    /// Convert every page of an existing PDF into SVG files.
    pub fn pdf_to_svgs(
        &self,
        pdf_path: &Path,
        image_dir: &Path,
        prefix: &str,
    ) -> Result<Vec<PathBuf>, DiagramError> {
        let stem = format!("{prefix}{}", short_hash(&pdf_path.display().to_string()));
        self.pdf_pages_to_svgs(pdf_path, image_dir, &stem)
    }

    fn pdf_pages_to_svgs(
        &self,
        pdf_path: &Path,
        image_dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, DiagramError> {
        fs::create_dir_all(image_dir)?;
        scrub(image_dir, stem);
        let pattern = image_dir.join(format!("{stem}-%d.svg"));
        let pdf = pdf_path.display().to_string();
        let out = pattern.display().to_string();
        if let Err(e) = run_tool(&self.pdf2svg, &[&pdf, &out, "all"], b"", None) {
            scrub(image_dir, stem);
            return Err(e);
        }

        let pages = collect_pages(image_dir, stem)?;
        if pages.is_empty() {
            return Err(DiagramError::InvalidOutput(format!(
                "{} produced no pages for {}",
                self.pdf2svg,
                pdf_path.display()
            )));
        }
        tracing::debug!(pages = pages.len(), stem, "Converted PDF pages");
        Ok(pages)
    }
}

/// Page files `{stem}-{n}.svg` sorted by page number.
fn collect_pages(image_dir: &Path, stem: &str) -> Result<Vec<PathBuf>, DiagramError> {
    let page_prefix = format!("{stem}-");
    let mut pages: Vec<(u32, PathBuf)> = fs::read_dir(image_dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let page = name.strip_prefix(&page_prefix)?.strip_suffix(".svg")?;
            Some((page.parse().ok()?, entry.path()))
        })
        .collect();
    pages.sort_by_key(|(page, _)| *page);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// Remove files in `dir` whose name starts with `stem`.
fn scrub(dir: &Path, stem: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        if entry.file_name().to_string_lossy().starts_with(stem) {
            if let Err(e) = fs::remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove stale artifact");
            }
        }
    }
}

/// Prefer the `!`-prefixed error lines of the TeX log over raw stderr.
fn tex_failure(error: DiagramError, log_path: &Path) -> DiagramError {
    let DiagramError::Failed { tool, status, stderr } = error else {
        return error;
    };
    let log_errors = fs::read_to_string(log_path)
        .map(|log| {
            log.lines()
                .filter(|line| line.starts_with('!'))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let stderr = if log_errors.is_empty() {
        stderr
    } else {
        log_errors
    };
    DiagramError::Failed {
        tool,
        status,
        stderr,
    }
}

/// Markdown image references for generated pages.
#[must_use]
pub fn page_images_markdown(pages: &[PathBuf], link_base: &str) -> String {
    let base = link_base.trim_end_matches('/');
    let mut out = String::new();
    for page in pages {
        let Some(name) = page.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        writeln!(out, "{}", image_markdown("", &format!("{base}/{name}"))).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_pages_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["doc-10.svg", "doc-2.svg", "doc-1.svg", "other-1.svg", "doc-x.svg"] {
            fs::write(dir.path().join(name), "<svg/>").unwrap();
        }
        let pages = collect_pages(dir.path(), "doc").unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["doc-1.svg", "doc-2.svg", "doc-10.svg"]);
    }

    #[test]
    fn test_scrub_removes_only_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc-1.svg"), "").unwrap();
        fs::write(dir.path().join("abc.log"), "").unwrap();
        fs::write(dir.path().join("keep.svg"), "").unwrap();

        scrub(dir.path(), "abc");

        assert!(!dir.path().join("abc-1.svg").exists());
        assert!(!dir.path().join("abc.log").exists());
        assert!(dir.path().join("keep.svg").exists());
    }

    #[test]
    fn test_page_images_markdown() {
        let pages = vec![PathBuf::from("/out/p1-1.svg"), PathBuf::from("/out/p1-2.svg")];
        assert_eq!(
            page_images_markdown(&pages, "/assets/"),
            "![](</assets/p1-1.svg>)\n![](</assets/p1-2.svg>)\n"
        );
    }

    #[test]
    fn test_missing_engine_scrubs_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let chain = LatexChain::new("quill-no-such-tex", "pdf2svg");
        let stem = format!("pre-{}", short_hash("x"));
        fs::write(dir.path().join(format!("{stem}-1.svg")), "stale").unwrap();

        let err = chain.compile_to_svgs("x", dir.path(), "pre-").unwrap_err();

        assert!(matches!(err, DiagramError::ToolMissing { .. }));
        assert!(!dir.path().join(format!("{stem}-1.svg")).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let chain = LatexChain::new("false", "pdf2svg");

        let err = chain.compile_to_svgs("x", dir.path(), "").unwrap_err();

        let DiagramError::Failed { tool, .. } = err else {
            panic!("expected Failed, got {err:?}");
        };
        assert_eq!(tool, "false");
    }

    #[test]
    fn test_tex_failure_prefers_log_errors() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("doc.log");
        fs::write(&log, "This is pdfTeX\n! Undefined control sequence.\nl.3 \\bad\n").unwrap();
        let error = DiagramError::Failed {
            tool: "pdflatex".to_owned(),
            status: "exit status: 1".to_owned(),
            stderr: String::new(),
        };

        let DiagramError::Failed { stderr, .. } = tex_failure(error, &log) else {
            panic!("expected Failed");
        };
        assert_eq!(stderr, "! Undefined control sequence.");
    }
}
