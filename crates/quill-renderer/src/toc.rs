//! Table of contents generation from heading records.

use std::fmt::Write;

use crate::html::HtmlBackend;
use crate::options::TocOptions;
use crate::renderer::MarkdownRenderer;
use crate::state::Heading;

/// Build a markdown list linking to each heading within the depth range.
///
/// Nesting is relative to the shallowest included level, so a document whose
/// headings start at `##` produces a flat top-level list.
#[must_use]
pub fn toc_markdown(headings: &[Heading], options: &TocOptions, indent: &str) -> String {
    let included: Vec<&Heading> = headings
        .iter()
        .filter(|h| (options.depth_from..=options.depth_to).contains(&h.level))
        .filter(|h| !h.content.is_empty())
        .collect();
    let Some(base) = included.iter().map(|h| h.level).min() else {
        return String::new();
    };

    let mut out = String::new();
    for heading in included {
        let depth = usize::from(heading.level - base);
        let bullet = if options.ordered { "1." } else { "-" };
        writeln!(
            out,
            "{}{bullet} [{}](#{})",
            indent.repeat(depth),
            escape_link_text(&heading.content),
            heading.id
        )
        .unwrap();
    }
    out
}

/// Render the table of contents to HTML.
#[must_use]
pub fn toc_html(headings: &[Heading], options: &TocOptions, indent: &str) -> String {
    let markdown = toc_markdown(headings, options, indent);
    if markdown.is_empty() {
        return String::new();
    }
    MarkdownRenderer::<HtmlBackend>::new()
        .render_markdown(&markdown)
        .html
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn heading(content: &str, level: u8, id: &str) -> Heading {
        Heading {
            content: content.to_owned(),
            level,
            id: id.to_owned(),
        }
    }

    fn sample() -> Vec<Heading> {
        vec![
            heading("Intro", 2, "intro"),
            heading("Details", 3, "details"),
            heading("Deep", 5, "deep"),
            heading("End [x]", 2, "end-x"),
        ]
    }

    #[test]
    fn test_unordered_nested() {
        let md = toc_markdown(&sample(), &TocOptions::default(), "  ");
        assert_eq!(
            md,
            "- [Intro](#intro)\n  - [Details](#details)\n      - [Deep](#deep)\n- [End \\[x\\]](#end-x)\n"
        );
    }

    #[test]
    fn test_ordered_depth_range() {
        let options = TocOptions {
            ordered: true,
            depth_from: 2,
            depth_to: 3,
        };
        let md = toc_markdown(&sample(), &options, "\t");
        assert_eq!(
            md,
            "1. [Intro](#intro)\n\t1. [Details](#details)\n1. [End \\[x\\]](#end-x)\n"
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(toc_markdown(&[], &TocOptions::default(), "  "), "");
        assert_eq!(toc_html(&[], &TocOptions::default(), "  "), "");
    }

    #[test]
    fn test_html() {
        let html = toc_html(&sample()[..2], &TocOptions::default(), "  ");
        assert!(html.starts_with("<ul>\n<li><a href=\"#intro\">Intro</a>"));
        assert!(html.contains("<a href=\"#details\">Details</a>"));
    }
}
