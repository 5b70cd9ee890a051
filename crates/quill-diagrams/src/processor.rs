//! Diagram and code-chunk splicing over expanded markdown.
//!
//! [`DiagramProcessor::process`] runs in three phases:
//!
//! 1. A sequential scan classifies every fence. Diagram fences consult the
//!    previous graphs cache; code-chunk fences are matched against the
//!    execution results in linked-list order.
//! 2. Diagram renders, LaTeX compilations and SVG rasterizations run in
//!    parallel on rayon.
//! 3. Results are spliced back in document order and the next graphs cache
//!    generation is sealed.
//!
//! A failure in one block becomes an inline error fragment. Only creating the
//! image directory for file output can fail the whole pass.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use quill_cache::{GraphsCache, GraphsCacheBuilder};
use quill_renderer::markers::{error_block, image_markdown};
use quill_renderer::options::{Align, ChunkOutput, CodeChunkOptions, DiagramOptions, TocOptions};
use quill_renderer::{Attributes, FenceTracker, Heading, OpeningFence, escape_html, toc_markdown};
use rayon::prelude::*;
use regex::Regex;

use crate::cache::{DiagramKey, short_hash};
use crate::chunks::{ChunkWalk, CodeChunkData, CodeChunks};
use crate::error::DiagramError;
use crate::kroki::KrokiClient;
use crate::language::{DiagramFormat, DiagramLanguage, RenderRoute};
use crate::latex::{LatexChain, page_images_markdown};
use crate::plantuml::{PlantUmlCommand, TaskCommand, prepare_source};
use crate::pool::DiagramTaskPool;
use crate::tool::{render_dot, svg_from_bytes, svg_to_png};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

static SVG_ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<svg\b.*?</svg>").unwrap());

/// Where rendered diagrams go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagramOutput {
    /// Inline SVG markup (preview).
    #[default]
    Inline,
    /// Image files in the image directory, referenced from the markdown.
    Files,
}

/// Inputs of one processing pass.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions<'a> {
    /// Directory diagram processes run in (resolves relative includes).
    pub working_directory: &'a Path,
    /// Where generated images are written.
    pub image_directory_path: &'a Path,
    /// How generated images are referenced from the markdown.
    pub image_link_base: &'a str,
    /// Prefix for generated file names.
    pub image_file_prefix: &'a str,
    /// Execution results of code chunks.
    pub code_chunks: &'a CodeChunks,
    /// Diagram markup from the previous pass.
    pub graphs: &'a GraphsCache,
    /// Headings of the expanded document, for `cmd="toc"` chunks.
    pub headings: &'a [Heading],
    /// Default TOC options.
    pub toc: TocOptions,
    /// TOC nesting indentation.
    pub toc_indent: &'a str,
    /// Inline markup or image files.
    pub output: DiagramOutput,
}

/// Result of one processing pass.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Markdown with diagrams and chunk results spliced in.
    pub output: String,
    /// Image files written during the pass.
    pub image_paths: Vec<PathBuf>,
    /// Next graphs cache generation.
    pub graphs: GraphsCache,
    /// Per-block failures and chunk correlation problems.
    pub warnings: Vec<String>,
}

/// Renders diagram fences and splices code-chunk results.
///
/// Holds the persistent `PlantUML` process pool, so one processor should be
/// kept for the lifetime of the host.
///
/// # Example
///
/// ```no_run
/// use quill_diagrams::{DiagramProcessor, PlantUmlCommand};
///
/// let processor = DiagramProcessor::new()
///     .plantuml(PlantUmlCommand::jar("java", "/opt/plantuml.jar"))
///     .kroki_url("https://kroki.io");
/// ```
pub struct DiagramProcessor {
    plantuml: TaskCommand,
    pool: DiagramTaskPool,
    dot: String,
    kroki: Option<KrokiClient>,
    raster_tool: String,
    format: DiagramFormat,
    latex: LatexChain,
    timeout: Duration,
}

impl Default for DiagramProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagramProcessor {
    /// Create a processor using `plantuml`, `dot` and `rsvg-convert` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        let plantuml = PlantUmlCommand::launcher().to_task_command();
        Self {
            pool: DiagramTaskPool::new(plantuml.clone()).timeout(DEFAULT_TIMEOUT),
            plantuml,
            dot: "dot".to_owned(),
            kroki: None,
            raster_tool: "rsvg-convert".to_owned(),
            format: DiagramFormat::Svg,
            latex: LatexChain::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set how `PlantUML` is started.
    #[must_use]
    pub fn plantuml(mut self, command: PlantUmlCommand) -> Self {
        self.plantuml = command.to_task_command();
        self.pool = DiagramTaskPool::new(self.plantuml.clone()).timeout(self.timeout);
        self
    }

    /// Use a prepared process pool for `PlantUML`.
    #[must_use]
    pub fn with_pool(mut self, pool: DiagramTaskPool) -> Self {
        self.pool = pool;
        self
    }

    /// Set the Graphviz executable.
    #[must_use]
    pub fn dot(mut self, dot: impl Into<String>) -> Self {
        self.dot = dot.into();
        self
    }

    /// Render other grammars through a Kroki server.
    #[must_use]
    pub fn kroki_url(mut self, url: &str) -> Self {
        self.kroki = Some(KrokiClient::new(url, self.timeout));
        self
    }

    /// Set the SVG → PNG rasterizer.
    #[must_use]
    pub fn raster_tool(mut self, tool: impl Into<String>) -> Self {
        self.raster_tool = tool.into();
        self
    }

    /// Set the file format for [`DiagramOutput::Files`].
    #[must_use]
    pub fn format(mut self, format: DiagramFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the LaTeX chain.
    #[must_use]
    pub fn latex(mut self, latex: LatexChain) -> Self {
        self.latex = latex;
        self
    }

    /// Set the timeout for renderer processes and HTTP requests.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.pool = DiagramTaskPool::new(self.plantuml.clone()).timeout(timeout);
        if let Some(kroki) = &self.kroki {
            self.kroki = Some(KrokiClient::new(kroki.server_url(), timeout));
        }
        self
    }

    /// The LaTeX chain, shared with PDF imports.
    #[must_use]
    pub fn latex_chain(&self) -> &LatexChain {
        &self.latex
    }

    /// Stop persistent renderer processes.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Rewrite diagram and code-chunk fences in `expanded`.
    pub fn process(
        &self,
        expanded: &str,
        options: &ProcessOptions<'_>,
    ) -> Result<ProcessOutput, DiagramError> {
        if options.output == DiagramOutput::Files {
            fs::create_dir_all(options.image_directory_path)?;
        }

        let mut scan = Scan::new(self, options);
        scan.run(expanded);
        let Scan {
            segments,
            jobs,
            mut warnings,
            mut builder,
            ..
        } = scan;

        let outputs: Vec<JobOutput> = jobs
            .par_iter()
            .map(|job| self.run_job(job, options))
            .collect();

        let mut image_paths = Vec::new();
        let mut output = String::with_capacity(expanded.len());
        let mut outputs: Vec<Option<JobOutput>> = outputs.into_iter().map(Some).collect();
        for segment in segments {
            match segment {
                Segment::Text(text) => output.push_str(&text),
                Segment::Job(index) => {
                    let Some(done) = outputs[index].take() else {
                        continue;
                    };
                    if let Some((hash, markup)) = done.rendered {
                        builder.insert(hash, markup);
                    }
                    if let Some(warning) = done.warning {
                        warnings.push(warning);
                    }
                    image_paths.extend(done.images);
                    output.push_str(&done.fragment);
                }
            }
        }

        Ok(ProcessOutput {
            output,
            image_paths,
            graphs: builder.finish(),
            warnings,
        })
    }

    fn run_job(&self, job: &Job, options: &ProcessOptions<'_>) -> JobOutput {
        match job {
            Job::Diagram {
                language,
                source,
                hash,
                cached,
                options: diagram_options,
            } => {
                let markup = match cached {
                    Some(markup) => Ok((markup.clone(), false)),
                    None => self
                        .render_markup(*language, source, options.working_directory)
                        .map(|markup| (markup, true)),
                };
                match markup {
                    Ok((markup, fresh)) => {
                        let mut output = self.diagram_fragment(&markup, hash, diagram_options, options);
                        if fresh && output.warning.is_none() {
                            output.rendered = Some((hash.clone(), markup));
                        }
                        output
                    }
                    Err(e) => JobOutput::failed(&format!("{} diagram", language.fence_language()), &e),
                }
            }
            Job::Latex { source } => {
                match self
                    .latex
                    .compile_to_svgs(source, options.image_directory_path, options.image_file_prefix)
                {
                    Ok(pages) => JobOutput {
                        fragment: page_images_markdown(&pages, options.image_link_base),
                        images: pages,
                        ..JobOutput::default()
                    },
                    Err(e) => JobOutput::failed("latex chunk", &e),
                }
            }
            Job::Rasterize { html } => self.rasterize_result(html, options),
        }
    }

    fn render_markup(
        &self,
        language: DiagramLanguage,
        source: &str,
        working_dir: &Path,
    ) -> Result<String, DiagramError> {
        let markup = match language.route(self.kroki.is_some()) {
            RenderRoute::PlantUml => {
                let document = self.pool.render(working_dir, &prepare_source(source))?;
                svg_from_bytes(document.as_bytes())?
            }
            RenderRoute::Dot => render_dot(&self.dot, source, Some(working_dir))?,
            RenderRoute::Kroki => match &self.kroki {
                Some(kroki) => kroki.render_svg(language, source)?,
                None => return Err(DiagramError::InvalidOutput("Kroki is not configured".to_owned())),
            },
            RenderRoute::Client => {
                return Err(DiagramError::InvalidOutput(format!(
                    "{} is rendered by the browser",
                    language.fence_language()
                )));
            }
        };
        tracing::debug!(language = language.fence_language(), "Rendered diagram");
        Ok(markup)
    }

    fn diagram_fragment(
        &self,
        svg: &str,
        hash: &str,
        diagram_options: &DiagramOptions,
        options: &ProcessOptions<'_>,
    ) -> JobOutput {
        let style = diagram_options
            .align
            .map(|align| format!(r#" style="text-align:{}""#, align_css(align)))
            .unwrap_or_default();

        if options.output == DiagramOutput::Inline {
            return JobOutput {
                fragment: format!(
                    "<figure class=\"diagram\"{style}>{}</figure>\n\n",
                    strip_blank_lines(svg)
                ),
                ..JobOutput::default()
            };
        }

        let name = diagram_options.filename.clone().unwrap_or_else(|| {
            format!(
                "{}{}.{}",
                options.image_file_prefix,
                &hash[..12.min(hash.len())],
                self.format.as_str()
            )
        });
        let path = options.image_directory_path.join(&name);
        if let Err(e) = self.write_image(svg, &path, diagram_options.filename.is_some()) {
            return JobOutput::failed("diagram image", &e);
        }

        let src = format!("{}?{}", link(options.image_link_base, &name), cache_buster());
        let alt = diagram_options.alt.as_deref().unwrap_or("");
        let fragment = if style.is_empty() {
            format!("{}\n\n", image_markdown(alt, &src))
        } else {
            format!(
                "<p{style}><img src=\"{}\" alt=\"{}\"></p>\n\n",
                escape_html(&src),
                escape_html(alt)
            )
        };
        JobOutput {
            fragment,
            images: vec![path],
            ..JobOutput::default()
        }
    }

    /// Write `svg` to `path` in the configured format.
    ///
    /// Hash-named files already on disk are up to date and left alone.
    fn write_image(&self, svg: &str, path: &Path, overwrite: bool) -> Result<(), DiagramError> {
        if !overwrite && path.exists() {
            return Ok(());
        }
        match self.format {
            DiagramFormat::Svg => fs::write(path, svg)?,
            DiagramFormat::Png => svg_to_png(&self.raster_tool, svg, path)?,
        }
        Ok(())
    }

    /// Replace every `<svg>` in an HTML result with a reference to an image file.
    fn rasterize_result(&self, html: &str, options: &ProcessOptions<'_>) -> JobOutput {
        let mut images = Vec::new();
        let mut failure = None;
        let replaced = SVG_ELEMENT.replace_all(html, |caps: &regex::Captures<'_>| {
            let svg = &caps[0];
            let name = format!(
                "{}{}.{}",
                options.image_file_prefix,
                short_hash(svg),
                self.format.as_str()
            );
            let path = options.image_directory_path.join(&name);
            match self.write_image(svg, &path, false) {
                Ok(()) => {
                    images.push(path);
                    format!("<img src=\"{}\">", escape_html(&link(options.image_link_base, &name)))
                }
                Err(e) => {
                    let fragment = error_block(&e.to_string());
                    failure = Some(e);
                    fragment
                }
            }
        });
        JobOutput {
            fragment: format!("{}\n", replaced.trim_end()),
            images,
            warning: failure.map(|e| format!("chunk result image: {e}")),
            rendered: None,
        }
    }
}

/// One unit of parallel work.
enum Job {
    Diagram {
        language: DiagramLanguage,
        source: String,
        hash: String,
        cached: Option<String>,
        options: DiagramOptions,
    },
    Latex {
        source: String,
    },
    Rasterize {
        html: String,
    },
}

#[derive(Default)]
struct JobOutput {
    fragment: String,
    images: Vec<PathBuf>,
    /// Freshly rendered markup to record in the next cache generation.
    rendered: Option<(String, String)>,
    warning: Option<String>,
}

impl JobOutput {
    fn failed(what: &str, error: &DiagramError) -> Self {
        tracing::warn!(error = %error, "{what} failed");
        Self {
            fragment: format!("{}\n\n", error_block(&format!("{what}: {error}"))),
            warning: Some(format!("{what}: {error}")),
            ..Self::default()
        }
    }
}

enum Segment {
    Text(String),
    Job(usize),
}

/// Sequential first pass.
struct Scan<'a> {
    processor: &'a DiagramProcessor,
    options: &'a ProcessOptions<'a>,
    segments: Vec<Segment>,
    text: String,
    jobs: Vec<Job>,
    warnings: Vec<String>,
    builder: GraphsCacheBuilder<'a>,
    /// `None` once chunk splicing has stopped.
    chunks: Option<ChunkWalk<'a>>,
    chunk_ordinal: usize,
}

impl<'a> Scan<'a> {
    fn new(processor: &'a DiagramProcessor, options: &'a ProcessOptions<'a>) -> Self {
        Self {
            processor,
            options,
            segments: Vec::new(),
            text: String::new(),
            jobs: Vec::new(),
            warnings: Vec::new(),
            builder: options.graphs.builder(),
            chunks: Some(options.code_chunks.walk()),
            chunk_ordinal: 0,
        }
    }

    fn run(&mut self, expanded: &str) {
        let mut lines = expanded.split_inclusive('\n');
        while let Some(line) = lines.next() {
            let Some(open) = OpeningFence::parse(line) else {
                if line.trim().is_empty() {
                    self.text
                        .push_str(if line.ends_with('\n') { "  \n" } else { "  " });
                } else {
                    self.text.push_str(line);
                }
                continue;
            };

            let mut tracker = FenceTracker::new();
            tracker.update(line);
            let mut body = String::new();
            let mut closing = None;
            for inner in lines.by_ref() {
                if tracker.update(inner) {
                    closing = Some(inner);
                    break;
                }
                body.push_str(inner);
            }
            match closing {
                Some(closing) => self.fence(line, &open, &body, closing),
                None => {
                    self.text.push_str(line);
                    self.text.push_str(&body);
                }
            }
        }
        self.flush_text();
    }

    fn fence(&mut self, line: &str, open: &OpeningFence<'_>, body: &str, closing: &str) {
        let language = open.language();
        let attrs = if open.rest().is_empty() {
            Attributes::new()
        } else {
            match Attributes::parse(open.rest()) {
                Ok(attrs) => attrs,
                Err(e) => {
                    self.warnings
                        .push(format!("fence `{language}`: malformed attributes: {e}"));
                    Attributes::new()
                }
            }
        };

        if let Some(chunk) = CodeChunkOptions::from_attrs(&attrs, language) {
            self.code_chunk(line, open, &attrs, &chunk, body, closing);
            return;
        }

        if let Some(diagram) = DiagramLanguage::parse(language)
            && diagram.route(self.processor.kroki.is_some()) != RenderRoute::Client
        {
            let diagram_options = DiagramOptions::from_attrs(&attrs);
            if diagram_options.code_block {
                self.push_plain_fence(open, body, closing);
            } else {
                self.diagram(diagram, &attrs, diagram_options, body);
            }
            return;
        }

        self.text.push_str(line);
        self.text.push_str(body);
        self.push_closing(closing);
    }

    fn diagram(
        &mut self,
        language: DiagramLanguage,
        attrs: &Attributes,
        diagram_options: DiagramOptions,
        body: &str,
    ) {
        let options_key = attrs.to_info_string();
        let hash = DiagramKey {
            source: body,
            endpoint: language.kroki_endpoint(),
            options: &options_key,
        }
        .compute_hash();
        let cached = self.builder.lookup(&hash);
        if cached.is_some() {
            tracing::debug!(hash = %&hash[..12], "Diagram cache hit");
        }
        self.push_job(Job::Diagram {
            language,
            source: body.to_owned(),
            hash,
            cached,
            options: diagram_options,
        });
    }

    fn code_chunk(
        &mut self,
        line: &str,
        open: &OpeningFence<'_>,
        attrs: &Attributes,
        chunk: &CodeChunkOptions,
        body: &str,
        closing: &str,
    ) {
        if chunk.cmd == "toc" {
            if !chunk.hide {
                self.push_plain_fence(open, body, closing);
            }
            let toc_options = TocOptions::from_attrs(attrs, self.options.toc);
            let toc = toc_markdown(self.options.headings, &toc_options, self.options.toc_indent);
            self.text.push_str(&toc);
            return;
        }

        let ordinal = self.chunk_ordinal;
        self.chunk_ordinal += 1;
        let Some(node) = self.next_chunk(ordinal, chunk.id.as_deref()) else {
            self.text.push_str(line);
            self.text.push_str(body);
            self.push_closing(closing);
            return;
        };

        let hide = chunk.hide || node.options.flag("hide");
        if !hide {
            self.push_plain_fence(open, body, closing);
        }
        self.chunk_result(chunk, node, body);
    }

    /// Advance the chunk list, stopping splicing on exhaustion or id mismatch.
    fn next_chunk(&mut self, ordinal: usize, fence_id: Option<&str>) -> Option<&'a CodeChunkData> {
        let walk = self.chunks.as_mut()?;
        let Some(node) = walk.next() else {
            if !self.options.code_chunks.is_empty() {
                self.warnings.push(format!(
                    "code chunk {ordinal}: no execution data left; remaining chunks are left as written"
                ));
            }
            self.chunks = None;
            return None;
        };
        if let Some(id) = fence_id
            && id != node.id
        {
            self.warnings.push(format!(
                "code chunk {ordinal}: id `{id}` does not match execution data `{}`; remaining chunks are left as written",
                node.id
            ));
            self.chunks = None;
            return None;
        }
        Some(node)
    }

    fn chunk_result(&mut self, chunk: &CodeChunkOptions, node: &CodeChunkData, body: &str) {
        if chunk.output == ChunkOutput::None {
            return;
        }
        if chunk.latex {
            self.push_job(Job::Latex {
                source: body.to_owned(),
            });
            return;
        }
        let result = node.result.trim_end();
        if result.is_empty() {
            return;
        }
        let matplotlib = chunk.matplotlib || node.options.flag("matplotlib");
        if (chunk.output == ChunkOutput::Html || matplotlib)
            && self.options.output == DiagramOutput::Files
            && result.contains("<svg")
        {
            self.push_job(Job::Rasterize {
                html: result.to_owned(),
            });
            return;
        }
        if chunk.output == ChunkOutput::Plain {
            self.text.push_str("```\n");
            self.text.push_str(result);
            self.text.push_str("\n```\n");
        } else {
            self.text.push_str(result);
            self.text.push('\n');
        }
    }

    /// Emit a fence with its attribute block stripped.
    fn push_plain_fence(&mut self, open: &OpeningFence<'_>, body: &str, closing: &str) {
        self.text.push_str(open.indent);
        self.text.push_str(open.marker);
        self.text.push_str(open.language());
        self.text.push('\n');
        self.text.push_str(body);
        self.push_closing(closing);
    }

    fn push_closing(&mut self, closing: &str) {
        self.text.push_str(closing);
        if !closing.ends_with('\n') {
            self.text.push('\n');
        }
    }

    fn push_job(&mut self, job: Job) {
        self.flush_text();
        self.segments.push(Segment::Job(self.jobs.len()));
        self.jobs.push(job);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.segments.push(Segment::Text(std::mem::take(&mut self.text)));
        }
    }
}

fn align_css(align: Align) -> &'static str {
    match align {
        Align::Left => "left",
        Align::Center => "center",
        Align::Right => "right",
    }
}

fn link(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        name.to_owned()
    } else {
        format!("{base}/{name}")
    }
}

fn cache_buster() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Drop blank lines so the markup stays a single HTML block.
fn strip_blank_lines(markup: &str) -> String {
    markup
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(markdown: &str, chunks: &CodeChunks) -> ProcessOutput {
        let dir = tempfile::tempdir().unwrap();
        let graphs = GraphsCache::default();
        let processor = DiagramProcessor::new();
        let options = ProcessOptions {
            working_directory: dir.path(),
            image_directory_path: &dir.path().join("assets"),
            image_link_base: "/assets",
            image_file_prefix: "",
            code_chunks: chunks,
            graphs: &graphs,
            headings: &[],
            toc: TocOptions::default(),
            toc_indent: "  ",
            output: DiagramOutput::Inline,
        };
        processor.process(markdown, &options).unwrap()
    }

    fn chunk(id: &str, result: &str) -> CodeChunkData {
        CodeChunkData {
            id: id.to_owned(),
            result: result.to_owned(),
            ..CodeChunkData::default()
        }
    }

    #[test]
    fn test_plain_markdown_only_blank_lines_change() {
        let out = run("# T\n\npara\n\n```rust\nfn x() {}\n\n```\n", &CodeChunks::new());
        assert_eq!(out.output, "# T\n  \npara\n  \n```rust\nfn x() {}\n\n```\n");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_client_diagram_passes_through() {
        let md = "```mermaid\ngraph TD; A-->B\n```\n";
        assert_eq!(run(md, &CodeChunks::new()).output, md);
    }

    #[test]
    fn test_code_block_option_keeps_fence() {
        let out = run("```puml {code_block}\nA -> B\n```\n", &CodeChunks::new());
        assert_eq!(out.output, "```puml\nA -> B\n```\n");
    }

    #[test]
    fn test_chunk_result_appended_and_attrs_stripped() {
        let chunks = CodeChunks::linked(vec![chunk("a", "42")]);
        let out = run("```python {cmd=true id=\"a\"}\nprint(42)\n```\n", &chunks);
        assert_eq!(out.output, "```python\nprint(42)\n```\n42\n");
    }

    #[test]
    fn test_hidden_chunk_keeps_result() {
        let chunks = CodeChunks::linked(vec![chunk("a", "<b>hi</b>")]);
        let out = run(
            "before\n```python {cmd=\"python\" hide=true output=\"html\"}\nprint()\n```\nafter\n",
            &chunks,
        );
        assert_eq!(out.output, "before\n<b>hi</b>\nafter\n");
    }

    #[test]
    fn test_hide_from_execution_data() {
        let mut node = chunk("a", "out");
        node.options = Attributes::parse("{hide}").unwrap();
        let out = run("```sh {cmd}\necho out\n```\n", &CodeChunks::linked(vec![node]));
        assert_eq!(out.output, "out\n");
    }

    #[test]
    fn test_plain_and_none_outputs() {
        let chunks = CodeChunks::linked(vec![chunk("a", "x"), chunk("b", "y")]);
        let out = run(
            "```sh {cmd output=plain}\n1\n```\n```sh {cmd output=none}\n2\n```\n",
            &chunks,
        );
        assert_eq!(out.output, "```sh\n1\n```\n```\nx\n```\n```sh\n2\n```\n");
    }

    #[test]
    fn test_exhausted_list_stops_splicing() {
        let chunks = CodeChunks::linked(vec![chunk("a", "1")]);
        let md = "```sh {cmd}\na\n```\n```sh {cmd}\nb\n```\n```sh {cmd}\nc\n```\n";
        let out = run(md, &chunks);
        assert_eq!(
            out.output,
            "```sh\na\n```\n1\n```sh {cmd}\nb\n```\n```sh {cmd}\nc\n```\n"
        );
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("code chunk 1"));
    }

    #[test]
    fn test_id_mismatch_stops_splicing() {
        let chunks = CodeChunks::linked(vec![chunk("a", "1"), chunk("b", "2")]);
        let md = "```sh {cmd id=z}\nx\n```\n```sh {cmd id=b}\ny\n```\n";
        let out = run(md, &chunks);
        assert_eq!(out.output, md);
        assert!(out.warnings[0].contains("`z`"));
    }

    #[test]
    fn test_no_chunk_data_is_silent() {
        let md = "```sh {cmd}\nls\n```\n";
        let out = run(md, &CodeChunks::new());
        assert_eq!(out.output, md);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_toc_chunk_uses_headings() {
        let dir = tempfile::tempdir().unwrap();
        let graphs = GraphsCache::default();
        let headings = vec![
            Heading {
                content: "One".to_owned(),
                level: 1,
                id: "one".to_owned(),
            },
            Heading {
                content: "Two".to_owned(),
                level: 2,
                id: "two".to_owned(),
            },
        ];
        let chunks = CodeChunks::new();
        let options = ProcessOptions {
            working_directory: dir.path(),
            image_directory_path: dir.path(),
            image_link_base: "",
            image_file_prefix: "",
            code_chunks: &chunks,
            graphs: &graphs,
            headings: &headings,
            toc: TocOptions::default(),
            toc_indent: "  ",
            output: DiagramOutput::Inline,
        };
        let out = DiagramProcessor::new()
            .process("```text {cmd=\"toc\" hide=true depth_from=2}\n```\n", &options)
            .unwrap();
        assert_eq!(out.output, "- [Two](#two)\n");
    }

    #[test]
    fn test_unclosed_fence_passes_through() {
        let md = "```puml\nA -> B\n";
        assert_eq!(run(md, &CodeChunks::new()).output, md);
    }

    #[test]
    fn test_missing_dot_renders_inline_error() {
        let dir = tempfile::tempdir().unwrap();
        let graphs = GraphsCache::default();
        let chunks = CodeChunks::new();
        let options = ProcessOptions {
            working_directory: dir.path(),
            image_directory_path: dir.path(),
            image_link_base: "",
            image_file_prefix: "",
            code_chunks: &chunks,
            graphs: &graphs,
            headings: &[],
            toc: TocOptions::default(),
            toc_indent: "  ",
            output: DiagramOutput::Inline,
        };
        let out = DiagramProcessor::new()
            .dot("quill-no-such-dot")
            .process("text\n```dot\ndigraph { a -> b }\n```\nmore\n", &options)
            .unwrap();

        assert!(out.output.starts_with("text\n<pre class=\"quill-error\""));
        assert!(out.output.ends_with("</pre>\n\nmore\n"));
        assert_eq!(out.warnings.len(), 1);
        assert!(out.graphs.is_empty());
    }

    #[cfg(unix)]
    mod pooled {
        use super::*;
        use pretty_assertions::assert_eq;

        /// Echoes each `@startuml` body back as an SVG document.
        const FAKE_PLANTUML: &str = r#"while IFS= read -r line; do
  case "$line" in
    @startuml) body="" ;;
    @enduml) printf '<svg><text>%s</text></svg>' "$body" ;;
    *) body="$body$line" ;;
  esac
done"#;

        fn processor(script: &str) -> DiagramProcessor {
            let pool = DiagramTaskPool::new(TaskCommand::new("sh", &["-c", script]))
                .timeout(Duration::from_secs(10));
            DiagramProcessor::new().with_pool(pool)
        }

        fn pass(
            processor: &DiagramProcessor,
            dir: &Path,
            markdown: &str,
            graphs: &GraphsCache,
            output: DiagramOutput,
        ) -> ProcessOutput {
            let chunks = CodeChunks::new();
            let options = ProcessOptions {
                working_directory: dir,
                image_directory_path: &dir.join("assets"),
                image_link_base: "/assets",
                image_file_prefix: "d-",
                code_chunks: &chunks,
                graphs,
                headings: &[],
                toc: TocOptions::default(),
                toc_indent: "  ",
                output,
            };
            processor.process(markdown, &options).unwrap()
        }

        #[test]
        fn test_inline_render_and_cache_reuse() {
            let dir = tempfile::tempdir().unwrap();
            let md = "# D\n```puml {align=center}\nA -> B\n```\n";

            let first = pass(
                &processor(FAKE_PLANTUML),
                dir.path(),
                md,
                &GraphsCache::default(),
                DiagramOutput::Inline,
            );
            assert_eq!(
                first.output,
                "# D\n<figure class=\"diagram\" style=\"text-align:center\"><svg><text>A -> B</text></svg></figure>\n\n"
            );
            assert_eq!(first.graphs.len(), 1);

            // A renderer that cannot start proves the second pass is served from cache.
            let second = pass(
                &processor("exit 1"),
                dir.path(),
                md,
                &first.graphs,
                DiagramOutput::Inline,
            );
            assert_eq!(second.output, first.output);
            assert!(second.warnings.is_empty());
            assert_eq!(second.graphs.len(), 1);
        }

        #[test]
        fn test_removed_diagrams_are_evicted() {
            let dir = tempfile::tempdir().unwrap();
            let renderer = processor(FAKE_PLANTUML);
            let first = pass(
                &renderer,
                dir.path(),
                "```puml\nA\n```\n```puml\nB\n```\n",
                &GraphsCache::default(),
                DiagramOutput::Inline,
            );
            assert_eq!(first.graphs.len(), 2);

            let second = pass(
                &renderer,
                dir.path(),
                "```puml\nB\n```\n",
                &first.graphs,
                DiagramOutput::Inline,
            );
            assert_eq!(second.graphs.len(), 1);
        }

        #[test]
        fn test_options_change_the_cache_key() {
            let dir = tempfile::tempdir().unwrap();
            let renderer = processor(FAKE_PLANTUML);
            let first = pass(
                &renderer,
                dir.path(),
                "```puml\nA\n```\n",
                &GraphsCache::default(),
                DiagramOutput::Inline,
            );
            let second = pass(
                &renderer,
                dir.path(),
                "```puml {align=left}\nA\n```\n",
                &first.graphs,
                DiagramOutput::Inline,
            );
            let key = |attrs: &str| {
                let options = Attributes::parse(attrs).unwrap().to_info_string();
                DiagramKey {
                    source: "A\n",
                    endpoint: DiagramLanguage::PlantUml.kroki_endpoint(),
                    options: &options,
                }
                .compute_hash()
            };
            assert!(first.graphs.contains(&key("")));
            assert!(second.graphs.contains(&key("{align=left}")));
            assert!(!second.graphs.contains(&key("")));
        }

        #[test]
        fn test_file_output_writes_svg() {
            let dir = tempfile::tempdir().unwrap();
            let out = pass(
                &processor(FAKE_PLANTUML),
                dir.path(),
                "```puml {alt=\"flow\"}\nA\n```\n",
                &GraphsCache::default(),
                DiagramOutput::Files,
            );

            assert_eq!(out.image_paths.len(), 1);
            let path = &out.image_paths[0];
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("d-") && name.ends_with(".svg"));
            assert_eq!(fs::read_to_string(path).unwrap(), "<svg><text>A</text></svg>");
            assert!(out.output.starts_with(&format!("![flow](</assets/{name}?")));
        }

        #[test]
        fn test_fixed_filename() {
            let dir = tempfile::tempdir().unwrap();
            let out = pass(
                &processor(FAKE_PLANTUML),
                dir.path(),
                "```puml {filename=\"seq.svg\" align=right}\nA\n```\n",
                &GraphsCache::default(),
                DiagramOutput::Files,
            );
            assert!(dir.path().join("assets/seq.svg").exists());
            assert!(out.output.starts_with("<p style=\"text-align:right\"><img src=\"/assets/seq.svg?"));
        }

        #[test]
        fn test_filename_with_space_stays_one_link() {
            let dir = tempfile::tempdir().unwrap();
            let out = pass(
                &processor(FAKE_PLANTUML),
                dir.path(),
                "```puml {filename=\"my flow.svg\"}\nA\n```\n",
                &GraphsCache::default(),
                DiagramOutput::Files,
            );
            assert!(dir.path().join("assets/my flow.svg").exists());
            assert!(out.output.starts_with("![](</assets/my flow.svg?"), "{}", out.output);
        }

        #[test]
        fn test_renderer_failure_is_isolated() {
            let dir = tempfile::tempdir().unwrap();
            let out = pass(
                &processor("exit 1"),
                dir.path(),
                "```puml\nA\n```\n```sh\nls\n```\n",
                &GraphsCache::default(),
                DiagramOutput::Inline,
            );
            assert!(out.output.starts_with("<pre class=\"quill-error\""));
            assert!(out.output.ends_with("```sh\nls\n```\n"));
            assert_eq!(out.warnings.len(), 1);
            assert!(out.graphs.is_empty());
        }
    }

    #[cfg(unix)]
    mod tools {
        use std::os::unix::fs::PermissionsExt;

        use super::*;
        use pretty_assertions::assert_eq;

        /// Stands in for `pdflatex`: writes a PDF next to the source, or a log
        /// with an error line when the source asks for it.
        const FAKE_TEX: &str = r#"for arg; do tex=$arg; done
stem=${tex%.tex}
if grep -q fail "$tex"; then
  echo '! Undefined control sequence.' > "$stem.log"
  exit 1
fi
printf pdf > "$stem.pdf""#;

        /// Stands in for `pdf2svg ... all`: writes two pages.
        const FAKE_PDF2SVG: &str = r#"base=${2%?d.svg}
printf '<svg>1</svg>' > "${base}1.svg"
printf '<svg>2</svg>' > "${base}2.svg""#;

        /// Write an executable shell script and return its path.
        fn script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        }

        fn export(
            processor: &DiagramProcessor,
            dir: &Path,
            markdown: &str,
            chunks: &CodeChunks,
        ) -> ProcessOutput {
            let graphs = GraphsCache::default();
            let options = ProcessOptions {
                working_directory: dir,
                image_directory_path: &dir.join("assets"),
                image_link_base: "/assets",
                image_file_prefix: "c-",
                code_chunks: chunks,
                graphs: &graphs,
                headings: &[],
                toc: TocOptions::default(),
                toc_indent: "  ",
                output: DiagramOutput::Files,
            };
            processor.process(markdown, &options).unwrap()
        }

        fn latex_processor(bin: &Path) -> DiagramProcessor {
            DiagramProcessor::new().latex(LatexChain::new(
                script(bin, "tex", FAKE_TEX),
                script(bin, "pdf2svg", FAKE_PDF2SVG),
            ))
        }

        #[test]
        fn test_latex_chunk_pages_spliced() {
            let bin = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let chunks = CodeChunks::linked(vec![chunk("t", "")]);
            let out = export(
                &latex_processor(bin.path()),
                dir.path(),
                "```latex {cmd=true id=\"t\" hide}\n\\documentclass{article}\n```\nafter\n",
                &chunks,
            );

            assert_eq!(out.image_paths.len(), 2, "{:?}", out.warnings);
            let names: Vec<_> = out
                .image_paths
                .iter()
                .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
                .collect();
            assert!(names[0].starts_with("c-") && names[0].ends_with("-1.svg"));
            assert!(names[1].ends_with("-2.svg"));
            assert_eq!(fs::read_to_string(&out.image_paths[1]).unwrap(), "<svg>2</svg>");
            assert_eq!(
                out.output,
                format!("![](</assets/{}>)\n![](</assets/{}>)\nafter\n", names[0], names[1])
            );
            assert!(out.warnings.is_empty());
        }

        #[test]
        fn test_latex_chunk_failure_is_inline() {
            let bin = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let chunks = CodeChunks::linked(vec![chunk("t", "")]);
            let out = export(
                &latex_processor(bin.path()),
                dir.path(),
                "```latex {cmd=true id=\"t\" hide}\n\\fail\n```\n",
                &chunks,
            );

            assert!(out.image_paths.is_empty());
            assert!(out.output.starts_with("<pre class=\"quill-error\""));
            assert_eq!(out.warnings.len(), 1);
            assert!(out.warnings[0].starts_with("latex chunk:"));
            assert!(out.warnings[0].contains("Undefined control sequence"));
        }

        #[test]
        fn test_html_result_svg_written_as_file() {
            let dir = tempfile::tempdir().unwrap();
            let chunks = CodeChunks::linked(vec![chunk("p", "<div><svg><g/></svg></div>")]);
            let out = export(
                &DiagramProcessor::new(),
                dir.path(),
                "```python {cmd=true id=\"p\" hide output=html}\nplot()\n```\n",
                &chunks,
            );

            assert_eq!(out.image_paths.len(), 1);
            let path = &out.image_paths[0];
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("c-") && name.ends_with(".svg"));
            assert_eq!(fs::read_to_string(path).unwrap(), "<svg><g/></svg>");
            assert_eq!(out.output, format!("<div><img src=\"/assets/{name}\"></div>\n"));
        }

        #[test]
        fn test_matplotlib_result_rasterized() {
            let bin = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let chunks = CodeChunks::linked(vec![chunk("m", "<svg><g/></svg>")]);
            let processor = DiagramProcessor::new()
                .format(DiagramFormat::Png)
                .raster_tool(script(bin.path(), "rsvg", "cat > /dev/null\nprintf PNG"));
            let out = export(
                &processor,
                dir.path(),
                "```python {cmd=true id=\"m\" hide matplotlib}\nplot()\n```\n",
                &chunks,
            );

            assert_eq!(out.image_paths.len(), 1);
            assert_eq!(fs::read_to_string(&out.image_paths[0]).unwrap(), "PNG");
            assert!(out.output.starts_with("<img src=\"/assets/c-"));
            assert!(out.output.ends_with(".png\">\n"));
        }

        #[test]
        fn test_rasterizer_failure_is_inline() {
            let bin = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let chunks = CodeChunks::linked(vec![chunk("p", "<p>before</p><svg><g/></svg>")]);
            let processor = DiagramProcessor::new()
                .format(DiagramFormat::Png)
                .raster_tool(script(bin.path(), "rsvg", "echo broken >&2\nexit 3"));
            let out = export(
                &processor,
                dir.path(),
                "```python {cmd=true id=\"p\" hide output=html}\nplot()\n```\n",
                &chunks,
            );

            assert!(out.image_paths.is_empty());
            assert!(out.output.starts_with("<p>before</p><pre class=\"quill-error\""));
            assert_eq!(out.warnings.len(), 1);
            assert!(out.warnings[0].starts_with("chunk result image:"));
            assert!(out.warnings[0].contains("broken"));
        }
    }

    #[test]
    fn test_strip_blank_lines() {
        assert_eq!(strip_blank_lines("<svg>\n\n  <g/>\n \n</svg>\n"), "<svg>\n  <g/>\n</svg>");
    }

    #[test]
    fn test_link() {
        assert_eq!(link("/assets/", "a.svg"), "/assets/a.svg");
        assert_eq!(link("", "a.svg"), "a.svg");
    }
}
