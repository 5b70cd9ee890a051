//! Options and pipeline setup shared by every command.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use quill_cache::GraphsCache;
use quill_config::{CliSettings, Config, FrontMatterMode, MathRendererKind};
use quill_diagrams::CodeChunks;
use quill_engine::{Engine, ParseOutput, ParseRequest, RenderMode, RenderState};

use crate::error::CliError;
use crate::output::Output;

/// Location of the persisted diagram cache, relative to the project root.
const GRAPHS_CACHE_PATH: &str = ".quill/cache/graphs.json";

/// Arguments naming a document and how to render it.
#[derive(Args)]
pub(crate) struct DocumentArgs {
    /// Path to the markdown file.
    pub file: PathBuf,

    /// Path to configuration file (default: auto-discover quill.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file with code chunk results (object keyed by id, or array).
    #[arg(long)]
    chunks: Option<PathBuf>,

    /// Kroki server URL for diagram rendering (overrides config).
    #[arg(long, env = "QUILL_KROKI_URL")]
    kroki_url: Option<String>,

    /// Math renderer: K (MathML), M (MathJax) or N (none) (overrides config).
    #[arg(long, value_parser = parse_math_renderer)]
    math_renderer: Option<MathRendererKind>,

    /// Front matter mode: hide, table or code (overrides config).
    #[arg(long, value_parser = parse_front_matter)]
    front_matter: Option<FrontMatterMode>,

    /// Do not read or write the persisted diagram cache.
    #[arg(long)]
    no_cache: bool,
}

fn parse_math_renderer(s: &str) -> Result<MathRendererKind, String> {
    MathRendererKind::parse(s).ok_or_else(|| format!("unknown math renderer `{s}`"))
}

fn parse_front_matter(s: &str) -> Result<FrontMatterMode, String> {
    FrontMatterMode::parse(s).ok_or_else(|| format!("unknown front matter mode `{s}`"))
}

/// A loaded document with its engine.
pub(crate) struct Document {
    pub config: Config,
    pub file: PathBuf,
    text: String,
    chunks: CodeChunks,
    engine: Engine,
    cache_path: Option<PathBuf>,
}

impl DocumentArgs {
    /// Load configuration, the document and its code chunk results.
    pub(crate) fn load(&self, image_directory: Option<String>) -> Result<Document, CliError> {
        let cli_settings = CliSettings {
            kroki_url: self.kroki_url.clone(),
            math_renderer: self.math_renderer,
            front_matter: self.front_matter,
            image_directory,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let file = absolute(&self.file)?;
        let text = fs::read_to_string(&file).map_err(|source| CliError::Read {
            path: file.clone(),
            source,
        })?;
        let chunks = match &self.chunks {
            Some(path) => read_chunks(path)?,
            None => CodeChunks::new(),
        };
        let cache_path = (!self.no_cache).then(|| config.project_dir.join(GRAPHS_CACHE_PATH));

        Ok(Document {
            engine: Engine::from_config(&config),
            config,
            file,
            text,
            chunks,
            cache_path,
        })
    }
}

impl Document {
    /// Run the pipeline, reusing and updating the persisted diagram cache.
    pub(crate) fn parse(
        &self,
        mode: RenderMode,
        version: &str,
        output: &Output,
    ) -> Result<ParseOutput, CliError> {
        let previous = RenderState {
            graphs: self
                .cache_path
                .as_deref()
                .map(|path| GraphsCache::load(path, version))
                .unwrap_or_default(),
            ..RenderState::default()
        };

        let result = self.engine.parse(
            &ParseRequest {
                text: &self.text,
                file_path: &self.file,
                mode,
                code_chunks: &self.chunks,
            },
            &previous,
        );
        self.engine.shutdown();
        let (parsed, state) = result?;

        if let Some(path) = &self.cache_path
            && let Err(e) = state.graphs.save(path, version)
        {
            output.warning(&format!("warning: cannot save diagram cache: {e}"));
        }
        output.warnings(&parsed.warnings);
        Ok(parsed)
    }

    /// Document title: the first heading, or the file stem.
    pub(crate) fn title(&self, parsed: &ParseOutput) -> String {
        title(&self.file, parsed)
    }
}

fn title(file: &Path, parsed: &ParseOutput) -> String {
    parsed
        .headings
        .first()
        .map(|h| h.content.clone())
        .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

fn absolute(path: &Path) -> Result<PathBuf, CliError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

fn read_chunks(path: &Path) -> Result<CodeChunks, CliError> {
    let json = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    CodeChunks::from_json(&json).map_err(|source| CliError::Chunks {
        path: path.to_path_buf(),
        source,
    })
}
