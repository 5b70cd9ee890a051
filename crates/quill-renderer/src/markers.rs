//! Structural marker tokens shared by the transformer and the renderer.
//!
//! The import transformer writes these into the expanded markdown; the
//! renderer's comment rule turns them into HTML that the engine splits on.

/// Comment written where a `[TOC]` line stood.
pub const TOC_MARKER: &str = "<!-- quill:toc -->";

/// Placeholder left in rendered HTML for the table of contents.
pub const TOC_PLACEHOLDER: &str = "{{QUILL_TOC}}";

/// HTML for a page break.
pub const PAGEBREAK_HTML: &str = r#"<div class="pagebreak"> </div>"#;

/// CSS class of the rendered slide boundary span.
pub const SLIDE_CLASS: &str = "quill-slide";

/// Comment written at a slide boundary.
#[must_use]
pub fn slide_marker(index: usize) -> String {
    format!("<!-- quill:slide {index} -->")
}

/// Span the renderer emits for a slide boundary.
#[must_use]
pub fn slide_span(index: usize) -> String {
    format!(r#"<span class="{SLIDE_CLASS}" data-index="{index}"></span>"#)
}

/// Scroll-sync anchor for a source line.
#[must_use]
pub fn sync_anchor(line: usize) -> String {
    format!(r#"<p data-line="{line}" class="sync-line" style="margin:0;"></p>"#)
}

/// Inline error fragment.
#[must_use]
pub fn error_block(message: &str) -> String {
    format!(
        r#"<pre class="quill-error" style="color:red">{}</pre>"#,
        crate::escape_html(message)
    )
}

/// Markdown image reference.
///
/// The destination is written in angle brackets so paths with spaces or
/// parentheses stay a single link.
#[must_use]
pub fn image_markdown(alt: &str, src: &str) -> String {
    let mut out = String::with_capacity(alt.len() + src.len() + 6);
    out.push_str("![");
    for c in alt.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push_str("](<");
    for c in src.chars() {
        if matches!(c, '<' | '>' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push_str(">)");
    out
}

/// A recognized structural comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentMarker {
    /// Slide boundary with its index.
    Slide(usize),
    /// Table of contents position.
    Toc,
    /// Page break.
    PageBreak,
}

impl CommentMarker {
    /// Recognize a comment that is the whole content of an HTML block.
    #[must_use]
    pub fn parse(html: &str) -> Option<Self> {
        let inner = html
            .trim()
            .strip_prefix("<!--")?
            .strip_suffix("-->")?
            .trim();
        let mut parts = inner.split_whitespace();
        match parts.next()? {
            "quill:toc" => Some(Self::Toc),
            "quill:slide" => parts.next()?.parse().ok().map(Self::Slide),
            "pagebreak" | "newpage" => Some(Self::PageBreak),
            _ => None,
        }
    }

    /// HTML replacing the comment.
    #[must_use]
    pub fn to_html(self) -> String {
        match self {
            Self::Slide(index) => slide_span(index),
            Self::Toc => TOC_PLACEHOLDER.to_owned(),
            Self::PageBreak => PAGEBREAK_HTML.to_owned(),
        }
    }
}
