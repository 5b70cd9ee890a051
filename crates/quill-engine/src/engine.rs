//! Parse pipeline.
//!
//! ```text
//! text ─► ImportTransformer ─► DiagramProcessor ─► front matter ─► MarkdownRenderer
//!                                                                      │
//!      RenderState ◄─ slides ◄─ image paths ◄─ TOC substitution ◄─ TOC diff
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use quill_cache::FilesCache;
use quill_config::{Config, FrontMatterMode, ImageFormat, MathRendererKind};
use quill_diagrams::{
    CodeChunks, DiagramFormat, DiagramOutput, DiagramProcessor, LatexChain, PlantUmlCommand,
    ProcessOptions,
};
use quill_import::{
    DefaultLoader, FileLoader, FrontMatter, ImportTransformer, SlideConfig, TransformOptions,
};
use quill_renderer::markers::TOC_PLACEHOLDER;
use quill_renderer::options::TocOptions;
use quill_renderer::{
    Heading, HtmlBackend, MarkdownRenderer, MathOptions, MathRenderer, PreviewBackend,
    RenderOptions, RenderResult, toc_html,
};
use serde::Serialize;

use crate::error::EngineError;
use crate::front_matter;
use crate::images::resolve_image_paths;
use crate::slides::{export_slides, preview_slides};
use crate::state::{RenderState, headings_changed};

/// Output target of a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Live preview: scroll-sync anchors, inline diagrams, `file://` images.
    #[default]
    Preview,
    /// Export: diagram files in the image directory, `<section>` slides.
    Export,
}

/// Engine settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Project root; `/`-rooted imports and image directories resolve here.
    pub project_dir: PathBuf,
    /// Protocols whose imports are passed to the loader unchanged.
    pub protocols_whitelist: Vec<String>,
    /// Image directory as configured. A leading `/` means project-relative.
    pub image_directory: String,
    /// Prefix of generated image file names.
    pub image_file_prefix: String,
    /// Math delimiters and backend.
    pub math: MathOptions,
    /// Extension appended to wiki link targets.
    pub wiki_extension: String,
    /// Front matter presentation.
    pub front_matter: FrontMatterMode,
    /// Table of contents defaults.
    pub toc: TocOptions,
    /// TOC list indentation.
    pub toc_indent: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            protocols_whitelist: Vec::new(),
            image_directory: "/assets".to_owned(),
            image_file_prefix: String::new(),
            math: MathOptions::default(),
            wiki_extension: ".md".to_owned(),
            front_matter: FrontMatterMode::Hide,
            toc: TocOptions::default(),
            toc_indent: "  ".to_owned(),
        }
    }
}

impl EngineOptions {
    /// Read engine settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let pairs = |pairs: &[[String; 2]]| {
            pairs
                .iter()
                .map(|[open, close]| (open.clone(), close.clone()))
                .collect()
        };
        Self {
            project_dir: config.project_dir.clone(),
            protocols_whitelist: config.import.protocols(),
            image_directory: config.import.image_directory.clone(),
            image_file_prefix: config.import.image_file_prefix.clone(),
            math: MathOptions {
                renderer: match config.math.renderer {
                    MathRendererKind::KaTeX => MathRenderer::MathMl,
                    MathRendererKind::MathJax => MathRenderer::MathJax,
                    MathRendererKind::None => MathRenderer::None,
                },
                inline_delimiters: pairs(&config.math.inline_delimiters),
                block_delimiters: pairs(&config.math.block_delimiters),
            },
            wiki_extension: config.wiki.extension.clone(),
            front_matter: config.front_matter.mode,
            toc: TocOptions {
                ordered: config.toc.ordered,
                depth_from: config.toc.depth_from,
                depth_to: config.toc.depth_to,
            },
            toc_indent: config.toc.indent.clone(),
        }
    }

    /// Absolute image directory.
    #[must_use]
    pub fn image_directory_path(&self) -> PathBuf {
        match self.image_directory.strip_prefix('/') {
            Some(rooted) => self.project_dir.join(rooted),
            None => {
                let path = Path::new(&self.image_directory);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.project_dir.join(path)
                }
            }
        }
    }
}

/// One parse request.
#[derive(Debug, Clone, Copy)]
pub struct ParseRequest<'a> {
    /// Document text.
    pub text: &'a str,
    /// Path of the document; relative imports resolve against its directory.
    pub file_path: &'a Path,
    /// Output target.
    pub mode: RenderMode,
    /// Latest code-chunk results.
    pub code_chunks: &'a CodeChunks,
}

/// Everything a parse produces besides the next [`RenderState`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutput {
    /// Final HTML.
    pub html: String,
    /// Markdown after import expansion and diagram splicing.
    pub markdown: String,
    /// Document headings in order.
    pub headings: Vec<Heading>,
    /// Table of contents HTML.
    pub toc_html: String,
    /// Whether the TOC was rebuilt in this parse.
    pub toc_regenerated: bool,
    /// Slide boundaries.
    pub slide_configs: Vec<SlideConfig>,
    /// Stylesheets and scripts to load in the preview.
    pub js_and_css_files: Vec<String>,
    /// Parsed front matter.
    pub front_matter: Option<FrontMatter>,
    /// Image files written by the diagram stage.
    pub image_paths: Vec<PathBuf>,
    /// Non-fatal problems from every stage.
    pub warnings: Vec<String>,
    /// Whether the resulting state was committed by a
    /// [`DocumentSession`](crate::DocumentSession).
    pub committed: bool,
}

/// Runs the full pipeline for one document at a time.
///
/// The engine holds no per-document state; every parse takes the previous
/// [`RenderState`] and returns the next one.
pub struct Engine<L = DefaultLoader> {
    options: EngineOptions,
    transformer: ImportTransformer<L>,
    processor: DiagramProcessor,
}

impl Engine<DefaultLoader> {
    /// Build an engine and its external tool bindings from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let loader = DefaultLoader::new(config.diagrams_resolved.timeout);
        Self::with_loader(config, loader)
    }
}

impl<L: FileLoader> Engine<L> {
    /// Build an engine reading imports through `loader`.
    #[must_use]
    pub fn with_loader(config: &Config, loader: L) -> Self {
        let tools = &config.diagrams_resolved;
        let plantuml = match &tools.plantuml_jar {
            Some(jar) => PlantUmlCommand::jar(&tools.java, jar),
            None => PlantUmlCommand::launcher(),
        };
        let latex = LatexChain::new(&tools.latex_engine, &tools.pdf2svg);

        let mut processor = DiagramProcessor::new()
            .timeout(tools.timeout)
            .plantuml(plantuml)
            .dot(&tools.dot)
            .raster_tool(&tools.raster_tool)
            .format(match tools.image_format {
                ImageFormat::Svg => DiagramFormat::Svg,
                ImageFormat::Png => DiagramFormat::Png,
            })
            .latex(latex.clone());
        if let Some(url) = &tools.kroki_url {
            processor = processor.kroki_url(url);
        }

        Self::from_parts(
            EngineOptions::from_config(config),
            ImportTransformer::with_loader(loader).latex(latex),
            processor,
        )
    }

    /// Assemble an engine from prepared stages.
    #[must_use]
    pub fn from_parts(
        options: EngineOptions,
        transformer: ImportTransformer<L>,
        processor: DiagramProcessor,
    ) -> Self {
        Self {
            options,
            transformer,
            processor,
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Stop persistent renderer processes.
    pub fn shutdown(&self) {
        self.processor.shutdown();
    }

    /// Parse with a fresh files cache.
    pub fn parse(
        &self,
        request: &ParseRequest<'_>,
        previous: &RenderState,
    ) -> Result<(ParseOutput, RenderState), EngineError> {
        self.parse_with_cache(request, previous, &mut FilesCache::new())
    }

    /// Parse, sharing `files_cache` with the caller.
    ///
    /// Exports drop cached PDF conversions first so page images are
    /// regenerated into the export image directory.
    pub fn parse_with_cache(
        &self,
        request: &ParseRequest<'_>,
        previous: &RenderState,
        files_cache: &mut FilesCache,
    ) -> Result<(ParseOutput, RenderState), EngineError> {
        let preview = request.mode == RenderMode::Preview;
        let file_directory = request
            .file_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let image_directory = self.options.image_directory_path();
        let image_link_base = if preview {
            image_directory.display().to_string()
        } else {
            self.options.image_directory.clone()
        };

        if !preview {
            let dropped = files_cache.invalidate_extension(".pdf");
            if dropped > 0 {
                tracing::debug!(dropped, "Invalidated cached PDF imports");
            }
            fs::create_dir_all(&image_directory).map_err(|source| {
                EngineError::ImageDirectory {
                    path: image_directory.clone(),
                    source,
                }
            })?;
        }

        let transformed = self.transformer.transform(
            request.text,
            &TransformOptions {
                file_directory_path: &file_directory,
                project_directory_path: &self.options.project_dir,
                for_preview: preview,
                protocols_whitelist: &self.options.protocols_whitelist,
                is_nested_import: false,
                image_directory_path: &image_directory,
                image_link_base: &image_link_base,
                image_file_prefix: &self.options.image_file_prefix,
            },
            files_cache,
        );
        let mut warnings = transformed.warnings;

        let processed = self.processor.process(
            &transformed.output,
            &ProcessOptions {
                working_directory: &file_directory,
                image_directory_path: &image_directory,
                image_link_base: &image_link_base,
                image_file_prefix: &self.options.image_file_prefix,
                code_chunks: request.code_chunks,
                graphs: &previous.graphs,
                headings: &transformed.headings,
                toc: self.options.toc,
                toc_indent: &self.options.toc_indent,
                output: if preview {
                    DiagramOutput::Inline
                } else {
                    DiagramOutput::Files
                },
            },
        )?;
        warnings.extend(processed.warnings);

        let mut markdown = processed.output;
        if let Some(fm) = &transformed.front_matter {
            let rendered = front_matter::render(fm, self.options.front_matter);
            if !rendered.is_empty() {
                markdown.insert_str(0, &rendered);
            }
        }

        let render_options = RenderOptions {
            math: self.options.math.clone(),
            wiki_extension: self.options.wiki_extension.clone(),
        };
        let rendered: RenderResult = if preview {
            MarkdownRenderer::<PreviewBackend>::with_options(render_options).render_markdown(&markdown)
        } else {
            MarkdownRenderer::<HtmlBackend>::with_options(render_options).render_markdown(&markdown)
        };
        warnings.extend(rendered.warnings);

        let headings = transformed.headings;
        let toc_regenerated = headings_changed(&previous.headings, &headings)
            || (previous.toc_html.is_empty() && !headings.is_empty());
        let toc = if toc_regenerated {
            tracing::debug!(headings = headings.len(), "Regenerating table of contents");
            toc_html(&headings, &self.options.toc, &self.options.toc_indent)
        } else {
            previous.toc_html.clone()
        };

        let mut html = rendered.html;
        if transformed.toc_bracket_found || html.contains(TOC_PLACEHOLDER) {
            html = html.replace(TOC_PLACEHOLDER, &toc);
        }
        if preview {
            html = resolve_image_paths(&html, &file_directory, &self.options.project_dir);
        }
        if !transformed.slide_configs.is_empty() {
            html = if preview {
                preview_slides(&html, &transformed.slide_configs)
            } else {
                export_slides(&html, &transformed.slide_configs)
            };
        }

        let state = RenderState {
            headings: headings.clone(),
            toc_html: toc.clone(),
            html: html.clone(),
            graphs: processed.graphs,
        };
        let output = ParseOutput {
            html,
            markdown,
            headings,
            toc_html: toc,
            toc_regenerated,
            slide_configs: transformed.slide_configs,
            js_and_css_files: transformed.js_and_css_files,
            front_matter: transformed.front_matter,
            image_paths: processed.image_paths,
            warnings,
            committed: false,
        };
        Ok((output, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_directory_path() {
        let options = EngineOptions {
            project_dir: PathBuf::from("/p"),
            ..EngineOptions::default()
        };
        assert_eq!(options.image_directory_path(), Path::new("/p/assets"));

        let relative = EngineOptions {
            image_directory: "out/img".to_owned(),
            ..options.clone()
        };
        assert_eq!(relative.image_directory_path(), Path::new("/p/out/img"));
    }

    #[test]
    fn test_options_from_config() {
        let config = Config::from_toml_str(
            "[math]\nrenderer = \"M\"\n[toc]\nordered = true\ndepth_to = 3\n[wiki]\nextension = \".html\"\n",
            Path::new("/p"),
        )
        .unwrap();
        let options = EngineOptions::from_config(&config);
        assert_eq!(options.math.renderer, MathRenderer::MathJax);
        assert!(options.toc.ordered);
        assert_eq!(options.toc.depth_to, 3);
        assert_eq!(options.wiki_extension, ".html");
        assert_eq!(options.project_dir, Path::new("/p"));
    }
}
