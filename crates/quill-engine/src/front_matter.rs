//! Front matter presentation.

use std::fmt::Write;

use quill_config::FrontMatterMode;
use quill_import::FrontMatter;
use quill_renderer::escape_html;
use serde_json::Value;

/// Markdown to prepend to the document for `front_matter` under `mode`.
pub(crate) fn render(front_matter: &FrontMatter, mode: FrontMatterMode) -> String {
    match mode {
        FrontMatterMode::Hide => String::new(),
        FrontMatterMode::Code => {
            let raw = front_matter.raw.trim_end();
            format!("```yaml\n---\n{raw}\n---\n```\n\n")
        }
        FrontMatterMode::Table => match &front_matter.data {
            Value::Null => String::new(),
            data => format!("{}\n\n", table(data)),
        },
    }
}

/// Nested HTML table: object keys become header cells, values the single row.
fn table(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut html = String::from("<table><thead><tr>");
            for key in map.keys() {
                write!(html, "<th>{}</th>", escape_html(key)).unwrap();
            }
            html.push_str("</tr></thead><tbody><tr>");
            for value in map.values() {
                write!(html, "<td>{}</td>", table(value)).unwrap();
            }
            html.push_str("</tr></tbody></table>");
            html
        }
        Value::Array(items) => {
            let mut html = String::from("<table><tbody><tr>");
            for item in items {
                write!(html, "<td>{}</td>", table(item)).unwrap();
            }
            html.push_str("</tr></tbody></table>");
            html
        }
        Value::String(s) => escape_html(s),
        Value::Null => String::new(),
        other => escape_html(&other.to_string()),
    }
}
