//! Generic markdown renderer with pluggable backend.

use std::fmt::Write;
use std::marker::PhantomData;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::attrs::Attributes;
use crate::backend::RenderBackend;
use crate::code_block::{CodeBlock, CodeBlockProcessor, ProcessResult, parse_fence_info};
use crate::highlight::{highlight, normalize_language};
use crate::markers::CommentMarker;
use crate::math::{self, MathOptions, render_math};
use crate::state::{CodeBlockState, Heading, HeadingState, ImageState, TableState, escape_html};
use crate::wikilink::rewrite_wikilinks;

/// Fence languages rendered client-side; emitted as a container holding the source.
const CLIENT_DIAGRAMS: &[&str] = &["mermaid", "wavedrom", "vega", "vega-lite"];

/// Result of rendering markdown.
#[derive(Clone, Debug)]
pub struct RenderResult {
    /// Rendered HTML.
    pub html: String,
    /// Headings in document order with their assigned ids.
    pub headings: Vec<Heading>,
    /// Warnings (malformed fence attributes, processor warnings).
    pub warnings: Vec<String>,
}

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Math delimiters and backend.
    pub math: MathOptions,
    /// Extension appended to wiki link targets.
    pub wiki_extension: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            math: MathOptions::default(),
            wiki_extension: ".md".to_owned(),
        }
    }
}

/// Generic markdown renderer with pluggable backend.
///
/// Shared elements (tables, lists, inline formatting) are handled here;
/// preview/export differences are delegated to the [`RenderBackend`].
///
/// # Code Block Processors
///
/// Custom fence handling can be added via [`with_processor`](Self::with_processor).
/// Processors are checked in order; the first returning a non-`PassThrough`
/// result wins.
pub struct MarkdownRenderer<B: RenderBackend> {
    output: String,
    code: CodeBlockState,
    table: TableState,
    image: ImageState,
    heading: HeadingState,
    pending_image: Option<(String, String)>,
    processors: Vec<Box<dyn CodeBlockProcessor>>,
    code_block_index: usize,
    options: RenderOptions,
    warnings: Vec<String>,
    _backend: PhantomData<B>,
}

impl<B: RenderBackend> MarkdownRenderer<B> {
    /// Create a renderer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    /// Create a renderer with the given options.
    #[must_use]
    pub fn with_options(options: RenderOptions) -> Self {
        Self {
            output: String::with_capacity(4096),
            code: CodeBlockState::default(),
            table: TableState::default(),
            image: ImageState::default(),
            heading: HeadingState::default(),
            pending_image: None,
            processors: Vec::new(),
            code_block_index: 0,
            options,
            warnings: Vec::new(),
            _backend: PhantomData,
        }
    }

    /// Add a code block processor.
    #[must_use]
    pub fn with_processor<P: CodeBlockProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Parser options used by [`render_markdown`](Self::render_markdown).
    #[must_use]
    pub fn parser_options() -> Options {
        Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES
    }

    /// Render markdown text, applying the wiki link and math rules.
    pub fn render_markdown(&mut self, markdown: &str) -> RenderResult {
        let linked = rewrite_wikilinks(markdown, &self.options.wiki_extension);
        let (prepared, spans) = math::extract(&linked, &self.options.math);
        let mut result = self.render(Parser::new_ext(&prepared, Self::parser_options()));
        result.html = math::restore(&result.html, &spans, self.options.math.renderer);
        result
    }

    /// Render parser events.
    ///
    /// Calls `post_process` on every registered processor afterwards.
    pub fn render<'a, I>(&mut self, events: I) -> RenderResult
    where
        I: Iterator<Item = Event<'a>>,
    {
        for event in events {
            self.process_event(event);
        }

        let mut html = std::mem::take(&mut self.output);
        for processor in &mut self.processors {
            processor.post_process(&mut html);
        }

        let mut warnings = std::mem::take(&mut self.warnings);
        warnings.extend(self.processors.iter().flat_map(|p| p.warnings()).cloned());

        RenderResult {
            html,
            headings: self.heading.take_headings(),
            warnings,
        }
    }

    fn push_inline(&mut self, content: &str) {
        if self.image.is_active() {
            return;
        }
        if self.heading.is_active() {
            self.heading.push_html(content);
        } else {
            self.output.push_str(content);
        }
    }

    fn process_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.inline_code(&code),
            Event::Html(html) => self.block_html(&html),
            Event::InlineHtml(html) => self.push_inline(&html),
            Event::SoftBreak => self.soft_break(),
            Event::HardBreak => B::hard_break(&mut self.output),
            Event::Rule => B::horizontal_rule(&mut self.output),
            Event::TaskListMarker(checked) => B::task_list_marker(checked, &mut self.output),
            Event::FootnoteReference(_) | Event::InlineMath(_) | Event::DisplayMath(_) => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.output.push_str("<p>"),
            Tag::Heading {
                level, id, classes, ..
            } => {
                self.heading.start_heading(
                    heading_level_to_num(level),
                    id.map(|id| id.to_string()),
                    classes.iter().map(ToString::to_string).collect(),
                );
            }
            Tag::BlockQuote(_) => B::blockquote_start(&mut self.output),
            Tag::CodeBlock(kind) => {
                let info = match kind {
                    CodeBlockKind::Fenced(info) if !info.trim().is_empty() => {
                        Some(info.to_string())
                    }
                    _ => None,
                };
                self.code.start(info);
            }
            Tag::List(start) => match start {
                Some(1) => self.output.push_str("<ol>\n"),
                Some(n) => writeln!(self.output, "<ol start=\"{n}\">").unwrap(),
                None => self.output.push_str("<ul>\n"),
            },
            Tag::Item => self.output.push_str("<li>"),
            Tag::FootnoteDefinition(_) | Tag::HtmlBlock | Tag::MetadataBlock(_) => {}
            Tag::DefinitionList => self.output.push_str("<dl>\n"),
            Tag::DefinitionListTitle => self.output.push_str("<dt>"),
            Tag::DefinitionListDefinition => self.output.push_str("<dd>"),
            Tag::Table(alignments) => {
                self.table.start(alignments);
                self.output.push_str("<table>");
            }
            Tag::TableHead => {
                self.table.start_head();
                self.output.push_str("<thead><tr>");
            }
            Tag::TableRow => {
                self.table.start_row();
                self.output.push_str("<tr>");
            }
            Tag::TableCell => {
                let align = self.table.current_alignment_style();
                let tag = if self.table.is_in_head() { "th" } else { "td" };
                write!(self.output, "<{tag}{align}>").unwrap();
            }
            Tag::Emphasis => self.push_inline("<em>"),
            Tag::Strong => self.push_inline("<strong>"),
            Tag::Strikethrough => self.push_inline("<del>"),
            Tag::Superscript => self.push_inline("<sup>"),
            Tag::Subscript => self.push_inline("<sub>"),
            Tag::Link {
                dest_url, title, ..
            } => {
                let mut link = format!(r#"<a href="{}""#, escape_html(&dest_url));
                if !title.is_empty() {
                    write!(link, r#" title="{}""#, escape_html(&title)).unwrap();
                }
                link.push('>');
                self.push_inline(&link);
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image.start();
                self.pending_image = Some((dest_url.to_string(), title.to_string()));
            }
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.output.push_str("</p>\n"),
            TagEnd::Heading(_) => {
                if let Some(heading) = self.heading.complete_heading() {
                    let level = heading.level;
                    write!(self.output, r#"<h{level} id="{}""#, escape_html(&heading.id)).unwrap();
                    if !heading.classes.is_empty() {
                        write!(
                            self.output,
                            r#" class="{}""#,
                            escape_html(&heading.classes.join(" "))
                        )
                        .unwrap();
                    }
                    writeln!(self.output, ">{}</h{level}>", heading.html.trim()).unwrap();
                }
            }
            TagEnd::BlockQuote(_) => B::blockquote_end(&mut self.output),
            TagEnd::CodeBlock => self.finish_code_block(),
            TagEnd::List(ordered) => {
                self.output
                    .push_str(if ordered { "</ol>\n" } else { "</ul>\n" });
            }
            TagEnd::Item => self.output.push_str("</li>\n"),
            TagEnd::FootnoteDefinition | TagEnd::HtmlBlock | TagEnd::MetadataBlock(_) => {}
            TagEnd::Image => {
                let alt = self.image.end();
                if let Some((src, title)) = self.pending_image.take() {
                    let mut img = String::new();
                    B::image(&src, &alt, &title, &mut img);
                    self.push_inline(&img);
                }
            }
            TagEnd::DefinitionList => self.output.push_str("</dl>\n"),
            TagEnd::DefinitionListTitle => self.output.push_str("</dt>\n"),
            TagEnd::DefinitionListDefinition => self.output.push_str("</dd>\n"),
            TagEnd::Table => self.output.push_str("</tbody></table>\n"),
            TagEnd::TableHead => {
                self.output.push_str("</tr></thead><tbody>");
                self.table.end_head();
            }
            TagEnd::TableRow => self.output.push_str("</tr>"),
            TagEnd::TableCell => {
                self.output.push_str(if self.table.is_in_head() {
                    "</th>"
                } else {
                    "</td>"
                });
                self.table.next_cell();
            }
            TagEnd::Emphasis => self.push_inline("</em>"),
            TagEnd::Strong => self.push_inline("</strong>"),
            TagEnd::Strikethrough => self.push_inline("</del>"),
            TagEnd::Link => self.push_inline("</a>"),
            TagEnd::Superscript => self.push_inline("</sup>"),
            TagEnd::Subscript => self.push_inline("</sub>"),
        }
    }

    /// Fence rule: processors first, then math, client diagrams and highlighting.
    fn finish_code_block(&mut self) {
        let (info, content) = self.code.end();
        let index = self.code_block_index;
        self.code_block_index += 1;

        let (language, attrs, error) = match info {
            Some(info) => parse_fence_info(&info),
            None => (String::new(), Attributes::new(), None),
        };
        if let Some(error) = error {
            self.warnings
                .push(format!("Invalid attributes on `{language}` fence: {error}"));
        }

        let block = CodeBlock {
            index,
            language: &language,
            attrs: &attrs,
            source: &content,
        };
        for processor in &mut self.processors {
            match processor.process(&block) {
                ProcessResult::Placeholder(html) | ProcessResult::Inline(html) => {
                    self.output.push_str(&html);
                    return;
                }
                ProcessResult::PassThrough => {}
            }
        }

        let lang = language.to_ascii_lowercase();
        if lang == "math" {
            self.output
                .push_str(&render_math(content.trim(), true, self.options.math.renderer));
            self.output.push('\n');
        } else if CLIENT_DIAGRAMS.contains(&lang.as_str()) {
            writeln!(
                self.output,
                "<div class=\"{lang}\">{}</div>",
                escape_html(&content)
            )
            .unwrap();
        } else {
            self.highlighted_block(&language, &attrs, &content);
        }
    }

    fn highlighted_block(&mut self, language: &str, attrs: &Attributes, content: &str) {
        if language.is_empty() {
            writeln!(self.output, "<pre><code>{}</code></pre>", escape_html(content)).unwrap();
            return;
        }
        let normalized = normalize_language(language);
        let mut class = format!("language-{normalized}");
        if let Some(extra) = attrs.get_str("class") {
            class.push(' ');
            class.push_str(&extra);
        }
        let body = highlight(language, content).unwrap_or_else(|| escape_html(content));
        writeln!(
            self.output,
            "<pre class=\"{}\"><code class=\"language-{}\">{body}</code></pre>",
            escape_html(&class),
            escape_html(&normalized)
        )
        .unwrap();
    }

    /// Custom-comment block rule.
    fn block_html(&mut self, html: &str) {
        match CommentMarker::parse(html) {
            Some(marker) => {
                self.output.push_str(&marker.to_html());
                self.output.push('\n');
            }
            None => self.output.push_str(html),
        }
    }

    fn text(&mut self, text: &str) {
        if self.code.is_active() {
            self.code.push_str(text);
        } else if self.image.is_active() {
            self.image.push_str(text);
        } else if self.heading.is_active() {
            self.heading.push_text(text);
            self.heading.push_html(&escape_html(text));
        } else {
            self.output.push_str(&escape_html(text));
        }
    }

    fn inline_code(&mut self, code: &str) {
        let html = format!("<code>{}</code>", escape_html(code));
        if self.image.is_active() {
            self.image.push_str(code);
        } else if self.heading.is_active() {
            self.heading.push_text(code);
            self.heading.push_html(&html);
        } else {
            self.output.push_str(&html);
        }
    }

    fn soft_break(&mut self) {
        if self.heading.is_active() {
            self.heading.push_text(" ");
            self.heading.push_html("\n");
        } else if self.image.is_active() {
            self.image.push_str(" ");
        } else {
            self.output.push('\n');
        }
    }
}

impl<B: RenderBackend> Default for MarkdownRenderer<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn heading_level_to_num(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::MathRenderer;
    use crate::{HtmlBackend, PreviewBackend};
    use pretty_assertions::assert_eq;

    fn render(markdown: &str) -> RenderResult {
        MarkdownRenderer::<HtmlBackend>::new().render_markdown(markdown)
    }

    fn render_with_math(markdown: &str, renderer: MathRenderer) -> RenderResult {
        let options = RenderOptions {
            math: MathOptions {
                renderer,
                ..MathOptions::default()
            },
            ..RenderOptions::default()
        };
        MarkdownRenderer::<HtmlBackend>::with_options(options).render_markdown(markdown)
    }

    #[test]
    fn test_paragraph() {
        assert_eq!(render("Hello, world!").html, "<p>Hello, world!</p>\n");
    }

    #[test]
    fn test_heading_ids_deduplicated() {
        let result = render("# Intro\n\n## Intro\n\n## Intro");
        assert!(result.html.contains(r#"<h1 id="intro">Intro</h1>"#));
        assert!(result.html.contains(r#"<h2 id="intro-1">Intro</h2>"#));
        assert!(result.html.contains(r#"<h2 id="intro-2">Intro</h2>"#));
        let ids: Vec<_> = result.headings.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["intro", "intro-1", "intro-2"]);
    }

    #[test]
    fn test_heading_explicit_id_and_class() {
        let result = render("# Title {#x .lead}\n\n# Title");
        assert!(result.html.contains(r#"<h1 id="x" class="lead">Title</h1>"#));
        assert!(result.html.contains(r#"<h1 id="title">Title</h1>"#));
    }

    #[test]
    fn test_heading_inline_formatting() {
        let result = render("## Hello **bold** `code`");
        assert_eq!(
            result.html,
            "<h2 id=\"hello-bold-code\">Hello <strong>bold</strong> <code>code</code></h2>\n"
        );
        assert_eq!(result.headings[0].content, "Hello bold code");
    }

    #[test]
    fn test_html_block_dollars_untouched() {
        let html = "<div><svg><text>cost $1 and $2</text></svg></div>\n";
        let result = render_with_math(&format!("{html}\nPaid $x$."), MathRenderer::MathJax);
        assert!(result.html.starts_with(html));
        assert!(result.html.contains(r#"<span class="math inline">\(x\)</span>"#));
    }

    #[test]
    fn test_table() {
        let result = render("| a | b |\n|:--|--:|\n| 1 | 2 |");
        assert_eq!(
            result.html,
            "<table><thead><tr><th style=\"text-align:left\">a</th><th style=\"text-align:right\">b</th></tr></thead><tbody><tr><td style=\"text-align:left\">1</td><td style=\"text-align:right\">2</td></tr></tbody></table>\n"
        );
    }

    #[test]
    fn test_task_list_backends() {
        let export = render("- [x] done");
        assert!(export.html.contains("checked disabled"));

        let preview = MarkdownRenderer::<PreviewBackend>::new().render_markdown("- [ ] todo");
        assert!(
            preview
                .html
                .contains(r#"<input type="checkbox" class="task-list-item-checkbox"> todo"#)
        );
    }

    #[test]
    fn test_image_alt_text() {
        let result = render(r#"![A *logo*](img/a.png "Logo")"#);
        assert_eq!(
            result.html,
            "<p><img src=\"img/a.png\" alt=\"A logo\" title=\"Logo\"></p>\n"
        );
    }

    #[test]
    fn test_wikilink_rule() {
        let result = render("See [[Setup Guide|setup]].");
        assert_eq!(
            result.html,
            "<p>See <a href=\"Setup Guide.md\">setup</a>.</p>\n"
        );
    }

    #[test]
    fn test_math_inline_and_display() {
        let result = render_with_math("Inline $a<b$.\n\n$$\nx^2\n$$", MathRenderer::MathJax);
        assert!(
            result
                .html
                .contains(r#"<span class="math inline">\(a&lt;b\)</span>"#)
        );
        assert!(
            result
                .html
                .contains(r#"<div class="math display">\[x^2\]</div>"#)
        );
        assert!(!result.html.contains("<p><div"));
    }

    #[test]
    fn test_math_in_code_untouched() {
        let result = render_with_math("`$x$`", MathRenderer::MathJax);
        assert_eq!(result.html, "<p><code>$x$</code></p>\n");
    }

    #[test]
    fn test_math_fence() {
        let result = render_with_math("```math\nx\n```", MathRenderer::None);
        assert_eq!(result.html, "<div class=\"math display\">x</div>\n");
    }

    #[test]
    fn test_client_diagram_fence() {
        let result = render("```mermaid\ngraph TD; A-->B\n```");
        assert_eq!(
            result.html,
            "<div class=\"mermaid\">graph TD; A--&gt;B\n</div>\n"
        );
    }

    #[test]
    fn test_highlighted_fence_uses_alias() {
        let result = render("```py {.numbered}\nprint(1)\n```");
        assert!(
            result
                .html
                .starts_with("<pre class=\"language-python numbered\"><code class=\"language-python\">")
        );
        assert!(result.html.contains("<span"));
    }

    #[test]
    fn test_plain_fence_escaped() {
        let result = render("```\n<b>\n```");
        assert_eq!(result.html, "<pre><code>&lt;b&gt;\n</code></pre>\n");
    }

    #[test]
    fn test_malformed_fence_attrs_warn() {
        let result = render("```js {title=\"x}\nlet a;\n```");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.html.contains("language-javascript"));
    }

    #[test]
    fn test_comment_markers() {
        let result = render("<!-- quill:slide 0 -->\n\n# A\n\n<!-- quill:toc -->\n\n<!-- pagebreak -->\n");
        assert!(
            result
                .html
                .contains(r#"<span class="quill-slide" data-index="0"></span>"#)
        );
        assert!(result.html.contains("{{QUILL_TOC}}"));
        assert!(result.html.contains(r#"<div class="pagebreak"> </div>"#));
    }

    #[test]
    fn test_other_comments_pass_through() {
        let result = render("<!-- just a note -->\n");
        assert_eq!(result.html, "<!-- just a note -->\n");
    }

    #[test]
    fn test_processor_runs_before_fence_rule() {
        struct Shout;
        impl CodeBlockProcessor for Shout {
            fn process(&mut self, block: &CodeBlock<'_>) -> ProcessResult {
                if block.language == "shout" {
                    ProcessResult::Inline(block.source.to_uppercase())
                } else {
                    ProcessResult::PassThrough
                }
            }
        }

        let result = MarkdownRenderer::<HtmlBackend>::new()
            .with_processor(Shout)
            .render_markdown("```shout\nhi\n```\n\n```\nlow\n```");
        assert!(result.html.starts_with("HI\n"));
        assert!(result.html.contains("<pre><code>low\n</code></pre>"));
    }
}
