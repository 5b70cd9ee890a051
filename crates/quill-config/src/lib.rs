//! Configuration management for quill.
//!
//! Parses `quill.toml` with serde and discovers the file by walking up from the
//! current directory. Every section is optional; missing keys fall back to
//! defaults that match a plain preview setup.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! Tool commands, paths and URLs support `${VAR}` and `${VAR:-default}`:
//!
//! - `import.image_directory`
//! - `diagrams.java`, `diagrams.plantuml_jar`, `diagrams.dot`
//! - `diagrams.kroki_url`, `diagrams.raster_tool`
//! - `diagrams.latex_engine`, `diagrams.pdf2svg`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "quill.toml";

/// Default protocols passed through by `@import` unchanged.
const DEFAULT_PROTOCOLS: &str = "http://, https://, atom://, file://, mailto:, tel:";

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the Kroki URL for diagram rendering.
    pub kroki_url: Option<String>,
    /// Override the math renderer.
    pub math_renderer: Option<MathRendererKind>,
    /// Override the front matter rendering mode.
    pub front_matter: Option<FrontMatterMode>,
    /// Override the image output directory.
    pub image_directory: Option<String>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Math delimiters and renderer.
    pub math: MathConfig,
    /// `@import` behavior.
    pub import: ImportConfig,
    /// Front matter rendering.
    pub front_matter: FrontMatterConfig,
    /// Theme names for code blocks and preview.
    pub theme: ThemeConfig,
    /// Wiki link settings.
    pub wiki: WikiConfig,
    /// Table of contents settings.
    pub toc: TocConfig,
    /// External diagram tools (paths are strings relative to the config file).
    diagrams: DiagramsConfigRaw,

    /// Resolved diagram tools (set after loading).
    #[serde(skip)]
    pub diagrams_resolved: DiagramsConfig,
    /// Directory used as the project root for `/`-prefixed imports.
    #[serde(skip)]
    pub project_dir: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Math renderer discriminator.
///
/// Accepts the single-letter forms (`K`, `M`, `N`) as well as full names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum MathRendererKind {
    /// Server-side MathML output.
    #[default]
    #[serde(alias = "K", alias = "katex", alias = "mathml")]
    KaTeX,
    /// Delimited source left for client-side MathJax.
    #[serde(alias = "M", alias = "mathjax")]
    MathJax,
    /// Math left as plain text.
    #[serde(alias = "N", alias = "none")]
    None,
}

impl MathRendererKind {
    /// Parse the discriminator used on the command line.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "K" | "k" | "katex" | "mathml" => Some(Self::KaTeX),
            "M" | "m" | "mathjax" => Some(Self::MathJax),
            "N" | "n" | "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Math configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MathConfig {
    /// Renderer used for detected math.
    pub renderer: MathRendererKind,
    /// Inline delimiter pairs, tried after block pairs.
    pub inline_delimiters: Vec<[String; 2]>,
    /// Block delimiter pairs, tried first.
    pub block_delimiters: Vec<[String; 2]>,
}

impl Default for MathConfig {
    fn default() -> Self {
        let pair = |open: &str, close: &str| [open.to_owned(), close.to_owned()];
        Self {
            renderer: MathRendererKind::default(),
            inline_delimiters: vec![pair("$", "$"), pair("\\(", "\\)")],
            block_delimiters: vec![pair("$$", "$$"), pair("\\[", "\\]")],
        }
    }
}

/// `@import` configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Comma-separated protocol prefixes that are passed through unresolved.
    pub protocols_whitelist: String,
    /// Directory for generated images. A leading `/` is relative to the project
    /// root, anything else to the document's directory.
    pub image_directory: String,
    /// Prefix for generated image filenames.
    pub image_file_prefix: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            protocols_whitelist: DEFAULT_PROTOCOLS.to_owned(),
            image_directory: "/assets".to_owned(),
            image_file_prefix: String::new(),
        }
    }
}

impl ImportConfig {
    /// Parsed protocol whitelist.
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        self.protocols_whitelist
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Front matter rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontMatterMode {
    /// Strip front matter from the output.
    #[default]
    Hide,
    /// Render front matter as an HTML table.
    Table,
    /// Render front matter as a YAML code block.
    Code,
}

impl FrontMatterMode {
    /// Parse a mode name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hide" => Some(Self::Hide),
            "table" => Some(Self::Table),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// Front matter configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FrontMatterConfig {
    /// How front matter is rendered.
    pub mode: FrontMatterMode,
}

/// Theme configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Highlighting theme for code blocks.
    pub code_block: String,
    /// Preview stylesheet name, passed through to the host.
    pub preview: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            code_block: "InspiredGitHub".to_owned(),
            preview: "github-light".to_owned(),
        }
    }
}

/// Wiki link configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Extension appended to wiki link targets.
    pub extension: String,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            extension: ".md".to_owned(),
        }
    }
}

/// Table of contents configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TocConfig {
    /// Numbered list instead of bullets.
    pub ordered: bool,
    /// Shallowest heading level included.
    pub depth_from: u8,
    /// Deepest heading level included.
    pub depth_to: u8,
    /// Indentation per nesting level.
    pub indent: String,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            ordered: false,
            depth_from: 1,
            depth_to: 6,
            indent: "  ".to_owned(),
        }
    }
}

/// Output format for diagrams written to files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Write SVG as produced by the renderer.
    #[default]
    Svg,
    /// Rasterize through the configured raster tool.
    Png,
}

/// Raw diagrams configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DiagramsConfigRaw {
    java: Option<String>,
    plantuml_jar: Option<String>,
    dot: Option<String>,
    kroki_url: Option<String>,
    raster_tool: Option<String>,
    image_format: Option<ImageFormat>,
    latex_engine: Option<String>,
    pdf2svg: Option<String>,
    timeout_secs: Option<u64>,
}

/// Resolved external tool configuration.
#[derive(Debug, Clone)]
pub struct DiagramsConfig {
    /// Java executable used to run `PlantUML`.
    pub java: String,
    /// `PlantUML` jar. When unset, a `plantuml` executable is used instead.
    pub plantuml_jar: Option<PathBuf>,
    /// Graphviz `dot` executable.
    pub dot: String,
    /// Kroki server URL for grammars without a local renderer.
    pub kroki_url: Option<String>,
    /// SVG to PNG converter.
    pub raster_tool: String,
    /// Output format for diagram files.
    pub image_format: ImageFormat,
    /// TeX engine producing PDF.
    pub latex_engine: String,
    /// PDF to SVG converter.
    pub pdf2svg: String,
    /// Timeout for a single diagram render.
    pub timeout: Duration,
}

impl Default for DiagramsConfig {
    fn default() -> Self {
        Self {
            java: "java".to_owned(),
            plantuml_jar: None,
            dot: "dot".to_owned(),
            kroki_url: None,
            raster_tool: "rsvg-convert".to_owned(),
            image_format: ImageFormat::Svg,
            latex_engine: "pdflatex".to_owned(),
            pdf2svg: "pdf2svg".to_owned(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`diagrams.plantuml_jar`").
        field: String,
        /// Error message (e.g., "${`PLANTUML_JAR`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `quill.toml` in the current directory and its parents, falling back
    /// to defaults rooted at the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// validation fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string rooted at `base`.
    ///
    /// # Errors
    ///
    /// Returns error if parsing, expansion or validation fails.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(kroki_url) = &settings.kroki_url {
            self.diagrams_resolved.kroki_url = Some(kroki_url.clone());
        }
        if let Some(renderer) = settings.math_renderer {
            self.math.renderer = renderer;
        }
        if let Some(mode) = settings.front_matter {
            self.front_matter.mode = mode;
        }
        if let Some(dir) = &settings.image_directory {
            self.import.image_directory.clone_from(dir);
        }
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            math: MathConfig::default(),
            import: ImportConfig::default(),
            front_matter: FrontMatterConfig::default(),
            theme: ThemeConfig::default(),
            wiki: WikiConfig::default(),
            toc: TocConfig::default(),
            diagrams: DiagramsConfigRaw::default(),
            diagrams_resolved: DiagramsConfig::default(),
            project_dir: base.to_path_buf(),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_math()?;
        self.validate_toc()?;
        self.validate_diagrams()?;
        require_non_empty(&self.import.image_directory, "import.image_directory")?;
        Ok(())
    }

    fn validate_math(&self) -> Result<(), ConfigError> {
        let pairs = self
            .math
            .inline_delimiters
            .iter()
            .map(|p| (p, "math.inline_delimiters"))
            .chain(
                self.math
                    .block_delimiters
                    .iter()
                    .map(|p| (p, "math.block_delimiters")),
            );
        for ([open, close], field) in pairs {
            if open.is_empty() || close.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{field} entries need a non-empty opening and closing delimiter"
                )));
            }
        }
        Ok(())
    }

    fn validate_toc(&self) -> Result<(), ConfigError> {
        let TocConfig {
            depth_from,
            depth_to,
            ..
        } = self.toc;
        if !(1..=6).contains(&depth_from) || !(1..=6).contains(&depth_to) {
            return Err(ConfigError::Validation(
                "toc.depth_from and toc.depth_to must be between 1 and 6".to_owned(),
            ));
        }
        if depth_from > depth_to {
            return Err(ConfigError::Validation(format!(
                "toc.depth_from ({depth_from}) cannot exceed toc.depth_to ({depth_to})"
            )));
        }
        Ok(())
    }

    fn validate_diagrams(&self) -> Result<(), ConfigError> {
        let diagrams = &self.diagrams_resolved;
        if let Some(ref kroki_url) = diagrams.kroki_url {
            require_non_empty(kroki_url, "diagrams.kroki_url")?;
            require_http_url(kroki_url, "diagrams.kroki_url")?;
        }
        require_non_empty(&diagrams.java, "diagrams.java")?;
        require_non_empty(&diagrams.dot, "diagrams.dot")?;
        require_non_empty(&diagrams.raster_tool, "diagrams.raster_tool")?;
        require_non_empty(&diagrams.latex_engine, "diagrams.latex_engine")?;
        require_non_empty(&diagrams.pdf2svg, "diagrams.pdf2svg")?;
        if diagrams.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "diagrams.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.import.image_directory =
            expand::expand_env(&self.import.image_directory, "import.image_directory")?;

        let d = &mut self.diagrams;
        expand::expand_opt(&mut d.java, "diagrams.java")?;
        expand::expand_opt(&mut d.plantuml_jar, "diagrams.plantuml_jar")?;
        expand::expand_opt(&mut d.dot, "diagrams.dot")?;
        expand::expand_opt(&mut d.kroki_url, "diagrams.kroki_url")?;
        expand::expand_opt(&mut d.raster_tool, "diagrams.raster_tool")?;
        expand::expand_opt(&mut d.latex_engine, "diagrams.latex_engine")?;
        expand::expand_opt(&mut d.pdf2svg, "diagrams.pdf2svg")?;
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let raw = &self.diagrams;
        let defaults = DiagramsConfig::default();
        self.diagrams_resolved = DiagramsConfig {
            java: raw.java.clone().unwrap_or(defaults.java),
            plantuml_jar: raw.plantuml_jar.as_deref().map(|jar| config_dir.join(jar)),
            dot: raw.dot.clone().unwrap_or(defaults.dot),
            kroki_url: raw.kroki_url.clone(),
            raster_tool: raw.raster_tool.clone().unwrap_or(defaults.raster_tool),
            image_format: raw.image_format.unwrap_or_default(),
            latex_engine: raw.latex_engine.clone().unwrap_or(defaults.latex_engine),
            pdf2svg: raw.pdf2svg.clone().unwrap_or(defaults.pdf2svg),
            timeout: raw
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
        };
        self.project_dir = config_dir.to_path_buf();
    }
}
