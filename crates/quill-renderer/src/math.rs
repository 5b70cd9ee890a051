//! Math detection and rendering.
//!
//! Math is lifted out of the markdown before parsing so the parser never sees
//! (and mangles) TeX syntax. Each span is replaced by a `{{MATH_N}}` token and
//! restored after rendering. Raw HTML blocks are passed over.

use std::fmt::Write;

use pulldown_latex::config::{DisplayMode, RenderConfig};
use pulldown_latex::mathml::push_mathml;
use pulldown_latex::{Parser, Storage};

use crate::fence::FenceTracker;
use crate::state::escape_html;

/// Math backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MathRenderer {
    /// Server-side MathML (`K`).
    #[default]
    MathMl,
    /// Delimited source for client-side MathJax (`M`).
    MathJax,
    /// Leave math as escaped text (`N`).
    None,
}

impl MathRenderer {
    /// Select a backend by its one-character discriminator.
    #[must_use]
    pub fn from_discriminator(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'K' => Some(Self::MathMl),
            'M' => Some(Self::MathJax),
            'N' => Some(Self::None),
            _ => None,
        }
    }
}

/// Math delimiters and backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathOptions {
    /// Backend.
    pub renderer: MathRenderer,
    /// Inline delimiter pairs.
    pub inline_delimiters: Vec<(String, String)>,
    /// Block delimiter pairs, tried before inline ones.
    pub block_delimiters: Vec<(String, String)>,
}

impl Default for MathOptions {
    fn default() -> Self {
        let pair = |a: &str, b: &str| (a.to_owned(), b.to_owned());
        Self {
            renderer: MathRenderer::MathMl,
            inline_delimiters: vec![pair("$", "$"), pair("\\(", "\\)")],
            block_delimiters: vec![pair("$$", "$$"), pair("\\[", "\\]")],
        }
    }
}

/// One math span lifted out of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MathSpan {
    source: String,
    display: bool,
    open: String,
    close: String,
}

/// Replace math spans with tokens, skipping code and raw HTML blocks.
pub(crate) fn extract(markdown: &str, options: &MathOptions) -> (String, Vec<MathSpan>) {
    let mut out = String::with_capacity(markdown.len());
    let mut spans = Vec::new();
    let mut fence = FenceTracker::new();
    let mut html: Option<HtmlBlock> = None;
    let mut in_paragraph = false;
    let mut prose = String::new();

    for line in markdown.split_inclusive('\n') {
        if let Some(block) = html {
            out.push_str(line);
            if block.ends(line) {
                html = None;
            }
            continue;
        }
        if fence.update(line) || fence.in_fence() {
            extract_prose(&prose, options, &mut out, &mut spans);
            prose.clear();
            out.push_str(line);
            in_paragraph = false;
            continue;
        }
        if let Some(block) = HtmlBlock::start(line, in_paragraph) {
            extract_prose(&prose, options, &mut out, &mut spans);
            prose.clear();
            out.push_str(line);
            if !block.ends(line) {
                html = Some(block);
            }
            in_paragraph = false;
            continue;
        }
        prose.push_str(line);
        in_paragraph = !line.trim().is_empty();
    }
    extract_prose(&prose, options, &mut out, &mut spans);
    (out, spans)
}

/// Tags whose block runs to the matching end tag, blank lines included.
const RAW_TAGS: [&str; 4] = ["pre", "script", "style", "textarea"];

/// Tags that open an HTML block closed by a blank line.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption", "center",
    "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5",
    "h6", "head", "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu",
    "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p", "param", "search", "section",
    "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "track", "ul",
];

/// A raw HTML block, which the parser passes through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HtmlBlock {
    /// Closed by `</tag>`.
    Raw(&'static str),
    /// Closed by `-->`.
    Comment,
    /// Closed by a blank line.
    UntilBlank,
}

impl HtmlBlock {
    fn start(line: &str, in_paragraph: bool) -> Option<Self> {
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3 {
            return None;
        }
        let rest = line[indent..].trim_end();
        if rest.starts_with("<!--") {
            return Some(Self::Comment);
        }
        let tag = rest.strip_prefix('<')?;
        let (closing, tag) = match tag.strip_prefix('/') {
            Some(tag) => (true, tag),
            None => (false, tag),
        };
        if !tag.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }
        let name_len = tag
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
            .count();
        let name = tag[..name_len].to_ascii_lowercase();
        let after = &tag[name_len..];
        if !(after.is_empty() || after.starts_with([' ', '\t', '>']) || after.starts_with("/>")) {
            return None;
        }

        if !closing && let Some(raw) = RAW_TAGS.iter().find(|t| **t == name) {
            return Some(Self::Raw(*raw));
        }
        if BLOCK_TAGS.contains(&name.as_str()) {
            return Some(Self::UntilBlank);
        }
        // Any other tag opens a block only when it is alone on its line.
        let standalone = after.find('>').is_some_and(|end| end + 1 == after.len());
        (standalone && !in_paragraph).then_some(Self::UntilBlank)
    }

    fn ends(self, line: &str) -> bool {
        match self {
            Self::Raw(tag) => line.to_ascii_lowercase().contains(&format!("</{tag}>")),
            Self::Comment => line.contains("-->"),
            Self::UntilBlank => line.trim().is_empty(),
        }
    }
}

fn token(index: usize) -> String {
    format!("{{{{MATH_{index}}}}}")
}

fn extract_prose(text: &str, options: &MathOptions, out: &mut String, spans: &mut Vec<MathSpan>) {
    let mut pos = 0;
    'scan: while pos < text.len() {
        let rest = &text[pos..];

        if rest.starts_with('`') {
            let ticks = rest.len() - rest.trim_start_matches('`').len();
            let run = &rest[..ticks];
            if let Some(end) = rest[ticks..].find(run) {
                let total = ticks + end + ticks;
                out.push_str(&rest[..total]);
                pos += total;
                continue;
            }
            out.push_str(run);
            pos += ticks;
            continue;
        }

        let candidates = options
            .block_delimiters
            .iter()
            .map(|d| (d, true))
            .chain(options.inline_delimiters.iter().map(|d| (d, false)));
        for ((open, close), display) in candidates {
            if open.is_empty() || !rest.starts_with(open.as_str()) {
                continue;
            }
            let body_start = open.len();
            if let Some(len) = find_close(&rest[body_start..], close, display) {
                let source = &rest[body_start..body_start + len];
                if source.trim().is_empty() {
                    continue;
                }
                out.push_str(&token(spans.len()));
                spans.push(MathSpan {
                    source: source.trim().to_owned(),
                    display,
                    open: open.clone(),
                    close: close.clone(),
                });
                pos += body_start + len + close.len();
                continue 'scan;
            }
        }

        let mut chars = rest.chars();
        let Some(c) = chars.next() else { break };
        out.push(c);
        pos += c.len_utf8();
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                pos += next.len_utf8();
            }
        }
    }
}

/// Find the closing delimiter, honoring backslash escapes.
///
/// Inline spans may not cross a blank line.
fn find_close(text: &str, close: &str, display: bool) -> Option<usize> {
    let mut iter = text.char_indices();
    while let Some((i, c)) = iter.next() {
        if text[i..].starts_with(close) {
            return Some(i);
        }
        if c == '\\' {
            iter.next();
        } else if !display && text[i..].starts_with("\n\n") {
            return None;
        }
    }
    None
}

/// Render one span with the configured backend.
#[must_use]
pub fn render_math(source: &str, display: bool, renderer: MathRenderer) -> String {
    match renderer {
        MathRenderer::MathMl => render_mathml(source, display),
        MathRenderer::MathJax => {
            let (open, close) = if display { ("\\[", "\\]") } else { ("\\(", "\\)") };
            wrap(display, &format!("{open}{}{close}", escape_html(source)))
        }
        MathRenderer::None => wrap(display, &escape_html(source)),
    }
}

fn wrap(display: bool, inner: &str) -> String {
    if display {
        format!(r#"<div class="math display">{inner}</div>"#)
    } else {
        format!(r#"<span class="math inline">{inner}</span>"#)
    }
}

fn render_mathml(latex: &str, display: bool) -> String {
    let storage = Storage::new();
    let parser = Parser::new(latex, &storage);
    let config = RenderConfig {
        display_mode: if display {
            DisplayMode::Block
        } else {
            DisplayMode::Inline
        },
        ..Default::default()
    };

    let events: Vec<_> = parser.collect();
    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| e.as_ref().err().map(ToString::to_string))
        .collect();
    if !errors.is_empty() {
        return math_error(latex, &errors.join("; "), display);
    }

    let mut mathml = String::new();
    match push_mathml(&mut mathml, events.into_iter(), config) {
        Ok(()) => wrap(display, &mathml),
        Err(e) => math_error(latex, &e.to_string(), display),
    }
}

fn math_error(latex: &str, error: &str, display: bool) -> String {
    tracing::debug!(error, "Math parse error");
    let mode = if display { "display" } else { "inline" };
    let mut out = String::new();
    write!(
        out,
        r#"<span class="math {mode} quill-error" style="color:red" title="{}"><code>{}</code></span>"#,
        escape_html(error),
        escape_html(latex)
    )
    .unwrap();
    out
}

/// Put rendered math back in place of its tokens.
///
/// A token that is the only content of a paragraph becomes a display block
/// without the surrounding `<p>`.
pub(crate) fn restore(html: &str, spans: &[MathSpan], renderer: MathRenderer) -> String {
    if spans.is_empty() {
        return html.to_owned();
    }
    let mut result = html.to_owned();
    for (index, span) in spans.iter().enumerate() {
        let token = token(index);
        let standalone = format!("<p>{token}</p>");
        if span.display && result.contains(&standalone) {
            let rendered = render_math(&span.source, true, renderer);
            result = result.replacen(&standalone, &rendered, 1);
            continue;
        }
        let rendered = if renderer == MathRenderer::None {
            escape_html(&format!("{}{}{}", span.open, span.source, span.close))
        } else {
            render_math(&span.source, span.display, renderer)
        };
        result = result.replacen(&token, &rendered, 1);
    }
    result
}
