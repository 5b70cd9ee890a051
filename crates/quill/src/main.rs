//! Quill CLI - markdown preview and export pipeline.
//!
//! Provides commands for:
//! - `render`: Render a document to preview HTML
//! - `export`: Write a standalone HTML document with diagram images
//! - `toc`: Print the document's headings as JSON

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ExportArgs, RenderArgs, TocArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Quill - markdown preview and export pipeline.
#[derive(Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    /// Enable verbose output (log process spawns and cache activity).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document to preview HTML.
    Render(RenderArgs),
    /// Export a document as standalone HTML.
    Export(ExportArgs),
    /// Print document headings as JSON.
    Toc(TocArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render(args) => args.execute(VERSION),
        Commands::Export(args) => args.execute(VERSION),
        Commands::Toc(args) => args.execute(VERSION),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
