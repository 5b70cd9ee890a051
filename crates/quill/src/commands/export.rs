//! `quill export` command implementation.

use std::path::{Path, PathBuf};

use clap::Args;
use quill_engine::{RenderMode, standalone_document, write_document};
use quill_renderer::theme_css;

use super::document::DocumentArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the export command.
#[derive(Args)]
pub(crate) struct ExportArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Output file (default: the document path with an `.html` extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Image directory; a leading `/` is relative to the project root (overrides config).
    #[arg(long)]
    image_directory: Option<String>,

    /// Write the expanded markdown instead of an HTML document.
    #[arg(long)]
    markdown: bool,
}

impl ExportArgs {
    /// Execute the export command.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, the image directory
    /// cannot be created or the output cannot be written.
    pub(crate) fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let document = self.document.load(self.image_directory.clone())?;
        output.info(&format!("Exporting {}...", document.file.display()));
        let parsed = document.parse(RenderMode::Export, version, &output)?;

        let target = self
            .output
            .clone()
            .unwrap_or_else(|| default_target(&document.file, self.markdown));
        let contents = if self.markdown {
            parsed.markdown.clone()
        } else {
            let css = theme_css(&document.config.theme.code_block);
            if css.is_none() {
                output.warning(&format!(
                    "warning: unknown code block theme `{}`",
                    document.config.theme.code_block
                ));
            }
            standalone_document(&parsed.html, &document.title(&parsed), css.as_deref(), "")
        };
        write_document(&target, &contents)?;

        output.success(&format!("Exported {}", target.display()));
        if !parsed.image_paths.is_empty() {
            output.info(&format!("Images ({}):", parsed.image_paths.len()));
            for image in &parsed.image_paths {
                output.info(&format!("  -> {}", image.display()));
            }
        }
        Ok(())
    }
}

fn default_target(file: &Path, markdown: bool) -> PathBuf {
    if markdown {
        let stem = file.file_stem().unwrap_or_default().to_string_lossy();
        file.with_file_name(format!("{stem}.export.md"))
    } else {
        file.with_extension("html")
    }
}
