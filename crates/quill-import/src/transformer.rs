//! Line-level transform of a quill document.
//!
//! [`ImportTransformer::transform`] makes a single pass over the source lines
//! and produces the intermediate markdown the diagram processor and renderer
//! consume:
//!
//! - front matter is stripped from top-level documents
//! - ATX and setext headings are recorded and rewritten with explicit ids
//! - `@import` directives are expanded in place
//! - slide, page break and `[TOC]` directives become marker tokens
//! - task list items get literal checkboxes
//! - executable fences are numbered
//!
//! Fenced code passes through verbatim. In preview mode, scroll-sync anchors
//! precede top-level headings, fences, imports and slides.

use std::path::Path;
use std::sync::LazyLock;

use quill_cache::FilesCache;
use quill_diagrams::LatexChain;
use quill_renderer::markers::{PAGEBREAK_HTML, TOC_MARKER, error_block, slide_marker, sync_anchor};
use quill_renderer::options::CodeChunkOptions;
use quill_renderer::{
    Attributes, FenceTracker, Heading, OpeningFence, SlugTable, inline_plain_text,
    rewrite_wikilinks, split_trailing_block,
};
use regex::Regex;
use serde::Serialize;

use crate::front_matter::{self, FrontMatter};
use crate::loader::{DefaultLoader, FileLoader};

/// Maximum nesting of markdown imports.
pub const MAX_IMPORT_DEPTH: usize = 16;

static TASK_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*(?:[-*+]|\d+[.)])\s+)\[([ xX])\](\s)").unwrap());

static SETEXT_UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(?:(=+)|-+)[ \t]*$").unwrap());

/// Block quotes and list items, which interrupt a paragraph.
static INTERRUPTS_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(?:>|(?:[-*+]|\d+[.)])(?:[ \t]|$))").unwrap());

/// A table delimiter row, which turns the paragraph above into a table header.
static TABLE_DELIMITER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}\|?[ \t]*:?-+:?[ \t]*(?:\|[ \t]*:?-+:?[ \t]*)*\|?[ \t]*$").unwrap()
});

/// Lines that cannot open a paragraph: tables, HTML, indented code and
/// thematic breaks.
static NOT_PARAGRAPH_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?: {4}|\t| {0,3}[|<]| {0,3}(?:(?:\*[ \t]*){3,}|(?:_[ \t]*){3,}|(?:-[ \t]*){3,})$)")
        .unwrap()
});

/// Inputs of one transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformOptions<'a> {
    /// Directory of the document, for relative imports.
    pub file_directory_path: &'a Path,
    /// Project root, for `/`-rooted imports.
    pub project_directory_path: &'a Path,
    /// Emit scroll-sync anchors, register scripts and stylesheets instead of
    /// inlining them, and cache-bust image links.
    pub for_preview: bool,
    /// Location prefixes passed through unresolved.
    pub protocols_whitelist: &'a [String],
    /// Set for recursive transforms of imported markdown.
    pub is_nested_import: bool,
    /// Where PDF page images are written.
    pub image_directory_path: &'a Path,
    /// How generated images are referenced.
    pub image_link_base: &'a str,
    /// Prefix for generated image names.
    pub image_file_prefix: &'a str,
}

/// A slide boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideConfig {
    /// Source line of the `<!-- slide -->` comment.
    pub line_no: usize,
    /// Attributes of the comment (`class`, `id`, `vertical`, `data-background-*`, ...).
    pub attributes: Attributes,
}

/// Result of a transform.
#[derive(Debug, Default)]
pub struct TransformOutput {
    /// Intermediate markdown.
    pub output: String,
    /// Headings in document order, imports included.
    pub headings: Vec<Heading>,
    /// Slide boundaries in order.
    pub slide_configs: Vec<SlideConfig>,
    /// Scripts and stylesheets registered for the preview.
    pub js_and_css_files: Vec<String>,
    /// Whether a `[TOC]` line was found.
    pub toc_bracket_found: bool,
    /// Stripped front matter of a top-level document.
    pub front_matter: Option<FrontMatter>,
    /// Recoverable problems, each also rendered inline.
    pub warnings: Vec<String>,
}

/// Expands imports and directives in quill markdown.
///
/// # Example
///
/// ```
/// use std::path::Path;
///
/// use quill_cache::FilesCache;
/// use quill_import::{ImportTransformer, MemoryLoader, TransformOptions};
///
/// let loader = MemoryLoader::new().with_file("/docs/intro.md", "## Intro\n");
/// let transformer = ImportTransformer::with_loader(loader);
/// let options = TransformOptions {
///     file_directory_path: Path::new("/docs"),
///     project_directory_path: Path::new("/docs"),
///     for_preview: false,
///     protocols_whitelist: &[],
///     is_nested_import: false,
///     image_directory_path: Path::new("/docs/assets"),
///     image_link_base: "/assets",
///     image_file_prefix: "",
/// };
///
/// let out = transformer.transform("# Guide\n@import \"intro.md\"\n", &options, &mut FilesCache::new());
/// assert_eq!(out.headings.len(), 2);
/// assert_eq!(out.headings[1].id, "intro");
/// ```
pub struct ImportTransformer<L = DefaultLoader> {
    loader: L,
    pub(crate) latex: LatexChain,
}

impl Default for ImportTransformer<DefaultLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportTransformer<DefaultLoader> {
    /// Create a transformer reading local files and `http(s)` URLs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_loader(DefaultLoader::default())
    }
}

impl<L: FileLoader> ImportTransformer<L> {
    /// Create a transformer with a custom loader.
    #[must_use]
    pub fn with_loader(loader: L) -> Self {
        Self {
            loader,
            latex: LatexChain::default(),
        }
    }

    /// Set the chain used to convert imported PDFs.
    #[must_use]
    pub fn latex(mut self, latex: LatexChain) -> Self {
        self.latex = latex;
        self
    }

    /// The loader.
    #[must_use]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Transform `text`.
    ///
    /// `files_cache` is shared with nested imports; callers create one per
    /// top-level transform.
    pub fn transform(
        &self,
        text: &str,
        options: &TransformOptions<'_>,
        files_cache: &mut FilesCache,
    ) -> TransformOutput {
        self.transform_nested(text, options, files_cache, &mut Vec::new())
    }

    /// Transform with the chain of markdown imports leading here.
    pub(crate) fn transform_nested(
        &self,
        text: &str,
        options: &TransformOptions<'_>,
        files_cache: &mut FilesCache,
        stack: &mut Vec<String>,
    ) -> TransformOutput {
        let mut scan = Scan {
            transformer: self,
            options,
            cache: files_cache,
            stack,
            out: TransformOutput::default(),
            slugs: SlugTable::new(),
            fence: FenceTracker::new(),
            paragraph: None,
            in_table: false,
            line_no: 0,
            chunk_offset: 0,
        };

        let mut body = text;
        if !options.is_nested_import
            && let Some(split) = front_matter::split(text)
        {
            if let Some(error) = split.error {
                tracing::warn!(%error, "Ignoring front matter");
                scan.out.warnings.push(error);
            }
            scan.line_no = split.lines;
            scan.out.front_matter = Some(split.front_matter);
            body = split.body;
        }

        for line in body.split_inclusive('\n') {
            scan.line(line);
            scan.line_no += 1;
        }
        scan.out
    }

    pub(crate) fn load(&self, location: &str, cache: &mut FilesCache) -> Result<String, crate::ImportError> {
        if let Some(content) = cache.get(location) {
            tracing::debug!(location, "Import cache hit");
            return Ok(content.to_owned());
        }
        let content = self.loader.load(location)?;
        cache.insert(location, content.clone());
        Ok(content)
    }
}

/// State of one transform pass.
pub(crate) struct Scan<'s, 'o, L> {
    pub(crate) transformer: &'s ImportTransformer<L>,
    pub(crate) options: &'s TransformOptions<'o>,
    pub(crate) cache: &'s mut FilesCache,
    pub(crate) stack: &'s mut Vec<String>,
    pub(crate) out: TransformOutput,
    slugs: SlugTable,
    fence: FenceTracker,
    paragraph: Option<Paragraph>,
    in_table: bool,
    pub(crate) line_no: usize,
    pub(crate) chunk_offset: usize,
}

/// The open paragraph, which a setext underline turns into a heading.
struct Paragraph {
    /// Offset of its first line in the output.
    start: usize,
    line_no: usize,
    text: String,
}

impl<L: FileLoader> Scan<'_, '_, L> {
    fn line(&mut self, line: &str) {
        let paragraph = self.paragraph.take();
        let in_table = std::mem::take(&mut self.in_table);
        if self.fence.in_fence() {
            self.fence.update(line);
            self.out.output.push_str(line);
            return;
        }

        if let Some(open) = OpeningFence::parse(line) {
            if open.indent.is_empty() {
                self.anchor();
            }
            self.fence.update(line);
            self.opening_fence(line, &open);
            return;
        }

        let content = line.trim_end_matches(['\n', '\r']);
        if let Some(paragraph) = paragraph.as_ref()
            && let Some(caps) = SETEXT_UNDERLINE.captures(content)
        {
            let level = if caps.get(1).is_some() { 1 } else { 2 };
            self.setext_heading(paragraph, level);
            return;
        }
        if let Some((level, text)) = parse_atx(content) {
            self.heading(level, text);
            return;
        }

        let trimmed = content.trim();
        if let Some(inner) = trimmed
            .strip_prefix("<!--")
            .and_then(|s| s.strip_suffix("-->"))
            && self.comment(inner.trim())
        {
            return;
        }
        if trimmed == "[TOC]" {
            self.out.toc_bracket_found = true;
            self.out.output.push_str(TOC_MARKER);
            self.out.output.push_str("\n\n");
            return;
        }
        if let Some(directive) = trimmed.strip_prefix("@import")
            && directive.starts_with(char::is_whitespace)
        {
            self.import(directive.trim());
            return;
        }

        if let Some(caps) = TASK_ITEM.captures(line) {
            let checked = if &caps[2] == " " { "" } else { " checked" };
            let data_line = if self.options.for_preview {
                format!(r#" data-line="{}""#, self.line_no)
            } else {
                String::new()
            };
            self.out.output.push_str(&caps[1]);
            self.out.output.push_str(&format!(
                r#"<input type="checkbox" class="task-list-item-checkbox"{data_line}{checked}>"#
            ));
            self.out.output.push_str(&caps[3]);
            self.out.output.push_str(&line[caps[0].len()..]);
            return;
        }

        if !trimmed.is_empty()
            && (in_table
                || (paragraph.is_some() && content.contains('|') && TABLE_DELIMITER.is_match(content)))
        {
            self.in_table = true;
        } else if !trimmed.is_empty() && !INTERRUPTS_PARAGRAPH.is_match(content) {
            self.paragraph = match paragraph {
                Some(mut paragraph) => {
                    paragraph.text.push('\n');
                    paragraph.text.push_str(trimmed);
                    Some(paragraph)
                }
                None if !NOT_PARAGRAPH_START.is_match(content) => Some(Paragraph {
                    start: self.out.output.len(),
                    line_no: self.line_no,
                    text: trimmed.to_owned(),
                }),
                None => None,
            };
        }
        self.out.output.push_str(line);
    }

    /// Rewrite the paragraph above a setext underline as an ATX heading.
    fn setext_heading(&mut self, paragraph: &Paragraph, level: u8) {
        self.out.output.truncate(paragraph.start);
        let line_no = std::mem::replace(&mut self.line_no, paragraph.line_no);
        let text = paragraph.text.replace('\n', " ");
        self.heading(level, &text);
        self.line_no = line_no;
    }

    /// Scroll-sync anchor for the current line (top-level preview only).
    pub(crate) fn anchor(&mut self) {
        if self.options.for_preview && !self.options.is_nested_import {
            self.out.output.push_str(&sync_anchor(self.line_no));
            self.out.output.push_str("\n\n");
        }
    }

    /// Number top-level executable fences.
    fn opening_fence(&mut self, line: &str, open: &OpeningFence<'_>) {
        if self.options.is_nested_import || open.rest().is_empty() {
            self.out.output.push_str(line);
            return;
        }
        let mut attrs = match Attributes::parse(open.rest()) {
            Ok(attrs) => attrs,
            Err(e) => {
                self.out
                    .warnings
                    .push(format!("line {}: malformed fence attributes: {e}", self.line_no + 1));
                self.out.output.push_str(line);
                return;
            }
        };
        match CodeChunkOptions::from_attrs(&attrs, open.language()) {
            Some(chunk) if chunk.cmd != "toc" => {
                attrs.insert("code_chunk_offset", self.chunk_offset);
                self.chunk_offset += 1;
                self.out.output.push_str(&format!(
                    "{}{}{} {}\n",
                    open.indent,
                    open.marker,
                    open.language(),
                    attrs.to_info_string()
                ));
            }
            _ => self.out.output.push_str(line),
        }
    }

    fn heading(&mut self, level: u8, text: &str) {
        self.anchor();
        let hashes = "#".repeat(usize::from(level));

        let (text, attrs) = match split_trailing_block(text) {
            Some((before, block)) => match Attributes::parse(block) {
                Ok(attrs) => (before.trim_end(), Some(attrs)),
                Err(e) => {
                    let message = format!("line {}: invalid heading attributes: {e}", self.line_no + 1);
                    self.out.output.push_str(&format!(
                        "{hashes} {}\n{}\n\n",
                        before.trim_end(),
                        error_block(&message)
                    ));
                    self.out.warnings.push(message);
                    return;
                }
            },
            None => (text, None),
        };

        let content = inline_plain_text(&rewrite_wikilinks(text, ""));
        let explicit_id = attrs.as_ref().and_then(|a| a.get_str("id"));
        let id = match &explicit_id {
            Some(id) => id.clone(),
            None => self.slugs.assign(&content),
        };
        let ignore = attrs.as_ref().is_some_and(|a| a.flag("ignore"));
        if !ignore {
            self.out.headings.push(Heading {
                content,
                level,
                id: id.clone(),
            });
        }

        // The renderer slugs text after math and wikilinks are rewritten, so
        // every heading carries the id recorded here.
        let mut suffix = Vec::new();
        if !id.is_empty() {
            suffix.push(format!("#{id}"));
        }
        if let Some(classes) = attrs.as_ref().and_then(|a| a.get_str("class")) {
            suffix.extend(classes.split_whitespace().map(|c| format!(".{c}")));
        }

        self.out.output.push_str(&hashes);
        if !text.is_empty() {
            self.out.output.push(' ');
            self.out.output.push_str(text);
        }
        if !suffix.is_empty() {
            self.out.output.push_str(&format!(" {{{}}}", suffix.join(" ")));
        }
        self.out.output.push('\n');
    }

    /// Handle a single-line comment. Returns `false` to pass it through.
    fn comment(&mut self, inner: &str) -> bool {
        let (subject, rest) = inner
            .split_once(char::is_whitespace)
            .map_or((inner, ""), |(s, r)| (s, r.trim()));
        match subject {
            "pagebreak" | "newpage" => {
                self.out.output.push_str(PAGEBREAK_HTML);
                self.out.output.push_str("\n\n");
                true
            }
            "slide" if !self.options.is_nested_import => {
                let attributes = Attributes::parse(rest).unwrap_or_else(|e| {
                    self.out
                        .warnings
                        .push(format!("line {}: invalid slide attributes: {e}", self.line_no + 1));
                    Attributes::new()
                });
                self.anchor();
                let index = self.out.slide_configs.len();
                self.out.slide_configs.push(SlideConfig {
                    line_no: self.line_no,
                    attributes,
                });
                self.out.output.push_str(&slide_marker(index));
                self.out.output.push_str("\n\n");
                true
            }
            "@import" => {
                self.import(rest);
                true
            }
            _ => false,
        }
    }
}

/// Split an ATX heading line into level and text.
///
/// The heading must start at column 0. A closing run of `#` is dropped.
fn parse_atx(line: &str) -> Option<(u8, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let mut text = rest.trim();
    let without_closing = text.trim_end_matches('#');
    if without_closing.is_empty() {
        text = "";
    } else if without_closing.ends_with([' ', '\t']) {
        text = without_closing.trim_end();
    }
    Some((u8::try_from(level).ok()?, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::MemoryLoader;

    fn options(for_preview: bool) -> TransformOptions<'static> {
        TransformOptions {
            file_directory_path: Path::new("/docs"),
            project_directory_path: Path::new("/docs"),
            for_preview,
            protocols_whitelist: &[],
            is_nested_import: false,
            image_directory_path: Path::new("/docs/assets"),
            image_link_base: "/assets",
            image_file_prefix: "",
        }
    }

    fn transform(text: &str) -> TransformOutput {
        ImportTransformer::with_loader(MemoryLoader::new()).transform(
            text,
            &options(false),
            &mut FilesCache::new(),
        )
    }

    fn ids(out: &TransformOutput) -> Vec<&str> {
        out.headings.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_plain_markdown_unchanged() {
        let text = "Some *text*.\n\n```rust\n# not a heading\n```\n\n- item\n---\n";
        let out = transform(text);
        assert_eq!(out.output, text);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_heading_slugs_unique() {
        let out = transform("# A\n## A\n### A\n# B\n");
        assert_eq!(ids(&out), ["a", "a-1", "a-2", "b"]);
    }

    #[test]
    fn test_heading_levels() {
        let out = transform("###### Six\n####### Seven\n#NoSpace\n#\n");
        assert_eq!(out.output, "###### Six {#six}\n####### Seven\n#NoSpace\n#\n");
        assert_eq!(out.headings.len(), 2);
        assert_eq!(out.headings[0].level, 6);
        assert_eq!(out.headings[1].content, "");
    }

    #[test]
    fn test_heading_attributes() {
        let out = transform("# Title {id=\"x\" .big}\n# Title\n## Skip {ignore=true}\n");
        assert_eq!(
            out.output,
            "# Title {#x .big}\n# Title {#title}\n## Skip {#skip}\n"
        );
        assert_eq!(ids(&out), ["x", "title"]);
    }

    #[test]
    fn test_heading_closing_hashes_and_inline_markup() {
        let out = transform("## Hello **bold** `code` ##\n");
        assert_eq!(out.headings[0].content, "Hello bold code");
        assert_eq!(out.headings[0].id, "hello-bold-code");
    }

    #[test]
    fn test_every_heading_gets_explicit_id() {
        let out = transform("# Euler $e^x$\n## [[page|Link]]\n");
        assert_eq!(out.output, "# Euler $e^x$ {#euler-ex}\n## [[page|Link]] {#link}\n");
    }

    #[test]
    fn test_setext_headings() {
        let out = transform("Intro\n=====\n\n# Intro\n\nTwo\nlines\n---\n");
        assert_eq!(ids(&out), ["intro", "intro-1", "two-lines"]);
        assert_eq!(out.headings[2].level, 2);
        assert_eq!(
            out.output,
            "# Intro {#intro}\n\n# Intro {#intro-1}\n\n## Two lines {#two-lines}\n"
        );
    }

    #[test]
    fn test_setext_underline_without_paragraph() {
        let text = "---\n\n- item\n---\n> quote\n---\n| a | b |\n|---|---|\n| 1 | 2 |\n---\n    code\n---\na | b\n--- | ---\n1 | 2\n---\n";
        let out = transform(text);
        assert_eq!(out.output, text);
        assert!(out.headings.is_empty());
    }

    #[test]
    fn test_setext_preview_anchor_at_paragraph() {
        let out = ImportTransformer::with_loader(MemoryLoader::new()).transform(
            "text\n\nTitle\n===\n",
            &options(true),
            &mut FilesCache::new(),
        );
        assert_eq!(
            out.output,
            "text\n\n<p data-line=\"2\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n# Title {#title}\n"
        );
    }

    #[test]
    fn test_bad_heading_attributes() {
        let out = transform("# Title {id=\"x}\n");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.output.starts_with("# Title\n<pre class=\"quill-error\""));
        assert!(out.headings.is_empty());
    }

    #[test]
    fn test_comment_directives() {
        let out = transform("<!-- pagebreak -->\n<!-- slide class=\"dark\" vertical -->\n<!-- note -->\n");
        assert_eq!(
            out.output,
            "<div class=\"pagebreak\"> </div>\n\n<!-- quill:slide 0 -->\n\n<!-- note -->\n"
        );
        assert_eq!(out.slide_configs.len(), 1);
        assert_eq!(out.slide_configs[0].line_no, 1);
        assert_eq!(out.slide_configs[0].attributes.get_str("class").as_deref(), Some("dark"));
        assert!(out.slide_configs[0].attributes.flag("vertical"));
    }

    #[test]
    fn test_toc_bracket() {
        let out = transform("[TOC]\n# A\n");
        assert!(out.toc_bracket_found);
        assert_eq!(out.output, "<!-- quill:toc -->\n\n# A {#a}\n");
    }

    #[test]
    fn test_task_items() {
        let out = transform("- [ ] todo\n* [x] done\n1. [X] first\n- [] no\n");
        assert_eq!(
            out.output,
            "- <input type=\"checkbox\" class=\"task-list-item-checkbox\"> todo\n\
             * <input type=\"checkbox\" class=\"task-list-item-checkbox\" checked> done\n\
             1. <input type=\"checkbox\" class=\"task-list-item-checkbox\" checked> first\n\
             - [] no\n"
        );
    }

    #[test]
    fn test_preview_anchors_and_task_lines() {
        let out = ImportTransformer::with_loader(MemoryLoader::new()).transform(
            "# A\ntext\n- [ ] t\n```sh\nx\n```\n",
            &options(true),
            &mut FilesCache::new(),
        );
        assert_eq!(
            out.output,
            "<p data-line=\"0\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n# A {#a}\n\
             text\n\
             - <input type=\"checkbox\" class=\"task-list-item-checkbox\" data-line=\"2\"> t\n\
             <p data-line=\"3\" class=\"sync-line\" style=\"margin:0;\"></p>\n\n```sh\nx\n```\n"
        );
    }

    #[test]
    fn test_chunk_offsets_stamped() {
        let out = transform("```python {cmd=true}\n1\n```\n```js {cmd=node id=\"b\"}\n2\n```\n```text {cmd=\"toc\"}\n```\n");
        assert_eq!(
            out.output,
            "```python {cmd=true code_chunk_offset=0}\n1\n```\n\
             ```js {cmd=\"node\" code_chunk_offset=1 id=\"b\"}\n2\n```\n\
             ```text {cmd=\"toc\"}\n```\n"
        );
    }

    #[test]
    fn test_front_matter_stripped_and_counted() {
        let out = ImportTransformer::with_loader(MemoryLoader::new()).transform(
            "---\ntitle: T\n---\n# A\n",
            &options(true),
            &mut FilesCache::new(),
        );
        assert_eq!(out.front_matter.unwrap().data["title"], "T");
        assert!(out.output.starts_with("<p data-line=\"3\""));
    }

    #[test]
    fn test_parse_atx() {
        assert_eq!(parse_atx("# A #"), Some((1, "A")));
        assert_eq!(parse_atx("## C#"), Some((2, "C#")));
        assert_eq!(parse_atx("###"), Some((3, "")));
        assert_eq!(parse_atx(" # indented"), None);
        assert_eq!(parse_atx("#tag"), None);
    }
}
