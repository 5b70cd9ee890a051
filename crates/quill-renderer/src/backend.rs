//! Render backend trait for mode-specific output.
//!
//! Preview output is interactive (checkboxes toggle source lines, images load
//! from disk), export output is static. The renderer is generic over this
//! trait so the two modes share all event handling.

/// Backend trait for mode-specific rendering operations.
pub trait RenderBackend {
    /// Whether output targets the live preview.
    const PREVIEW: bool;

    /// Render a task list checkbox produced by the parser.
    fn task_list_marker(checked: bool, out: &mut String);

    /// Render an image.
    fn image(src: &str, alt: &str, title: &str, out: &mut String);

    /// Render blockquote start tag.
    fn blockquote_start(out: &mut String) {
        out.push_str("<blockquote>\n");
    }

    /// Render blockquote end tag.
    fn blockquote_end(out: &mut String) {
        out.push_str("</blockquote>\n");
    }

    /// Render a hard break.
    fn hard_break(out: &mut String) {
        out.push_str("<br>\n");
    }

    /// Render a horizontal rule.
    fn horizontal_rule(out: &mut String) {
        out.push_str("<hr>\n");
    }
}
