//! HTML backends for export and preview.

use std::fmt::Write;

use crate::backend::RenderBackend;
use crate::state::escape_html;

/// Static HTML for exported documents.
///
/// Checkboxes are disabled and image sources are left as written.
pub struct HtmlBackend;

/// Interactive HTML for the live preview.
///
/// Checkboxes stay clickable so the host can toggle the source line.
pub struct PreviewBackend;

fn write_image(src: &str, alt: &str, title: &str, out: &mut String) {
    write!(out, r#"<img src="{}" alt="{}""#, escape_html(src), escape_html(alt)).unwrap();
    if !title.is_empty() {
        write!(out, r#" title="{}""#, escape_html(title)).unwrap();
    }
    out.push('>');
}

impl RenderBackend for HtmlBackend {
    const PREVIEW: bool = false;

    fn task_list_marker(checked: bool, out: &mut String) {
        out.push_str(r#"<input type="checkbox" class="task-list-item-checkbox""#);
        if checked {
            out.push_str(" checked");
        }
        out.push_str(" disabled> ");
    }

    fn image(src: &str, alt: &str, title: &str, out: &mut String) {
        write_image(src, alt, title, out);
    }
}

impl RenderBackend for PreviewBackend {
    const PREVIEW: bool = true;

    fn task_list_marker(checked: bool, out: &mut String) {
        out.push_str(r#"<input type="checkbox" class="task-list-item-checkbox""#);
        if checked {
            out.push_str(" checked");
        }
        out.push_str("> ");
    }

    fn image(src: &str, alt: &str, title: &str, out: &mut String) {
        write_image(src, alt, title, out);
    }
}
