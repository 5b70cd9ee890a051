//! `quill render` command implementation.

use std::path::PathBuf;

use clap::Args;
use quill_engine::{RenderMode, write_document};

use super::document::DocumentArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Write the HTML to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the expanded markdown instead of HTML.
    #[arg(long)]
    markdown: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or the output written.
    pub(crate) fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let document = self.document.load(None)?;
        let parsed = document.parse(RenderMode::Preview, version, &output)?;

        let contents = if self.markdown {
            &parsed.markdown
        } else {
            &parsed.html
        };
        match &self.output {
            Some(path) => {
                write_document(path, contents)?;
                output.success(&format!("Rendered {}", path.display()));
            }
            None => output.document(contents)?,
        }
        for file in &parsed.js_and_css_files {
            output.info(&format!("  asset: {file}"));
        }
        Ok(())
    }
}
