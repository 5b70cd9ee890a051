//! `quill toc` command implementation.

use clap::Args;
use quill_engine::RenderMode;

use super::document::DocumentArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the toc command.
#[derive(Args)]
pub(crate) struct TocArgs {
    #[command(flatten)]
    document: DocumentArgs,

    /// Print the table of contents HTML instead of JSON.
    #[arg(long)]
    html: bool,
}

impl TocArgs {
    /// Execute the toc command.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read.
    pub(crate) fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let document = self.document.load(None)?;
        let parsed = document.parse(RenderMode::Preview, version, &output)?;

        if self.html {
            output.document(&parsed.toc_html)?;
        } else {
            output.document(&serde_json::to_string_pretty(&parsed.headings)?)?;
        }
        Ok(())
    }
}
