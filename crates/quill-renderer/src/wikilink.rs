//! `[[target]]` and `[[target|label]]` wiki links.
//!
//! Rewritten to ordinary markdown links before parsing. Fenced and inline code
//! are left alone.

use std::sync::LazyLock;

use regex::Regex;

use crate::fence::FenceTracker;

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]\|\n]+?)(?:\|([^\]\n]+?))?\]\]").unwrap());

/// Rewrite wiki links into markdown links whose href ends in `extension`.
#[must_use]
pub fn rewrite_wikilinks(markdown: &str, extension: &str) -> String {
    if !markdown.contains("[[") {
        return markdown.to_owned();
    }
    let mut out = String::with_capacity(markdown.len());
    let mut fence = FenceTracker::new();
    for line in markdown.split_inclusive('\n') {
        if fence.update(line) || fence.in_fence() {
            out.push_str(line);
        } else {
            rewrite_line(line, extension, &mut out);
        }
    }
    out
}

fn rewrite_line(line: &str, extension: &str, out: &mut String) {
    // Alternate between text and inline code segments split on backticks.
    let mut in_code = false;
    for (i, segment) in line.split('`').enumerate() {
        if i > 0 {
            out.push('`');
        }
        if in_code {
            out.push_str(segment);
        } else {
            let replaced = WIKILINK_RE.replace_all(segment, |caps: &regex::Captures<'_>| {
                let target = caps[1].trim();
                let label = caps.get(2).map_or(target, |m| m.as_str().trim());
                format!("[{label}](<{}>)", wiki_href(target, extension))
            });
            out.push_str(&replaced);
        }
        in_code = !in_code;
    }
}

/// Build the href for a wiki link target, keeping any `#fragment`.
fn wiki_href(target: &str, extension: &str) -> String {
    let (page, fragment) = match target.split_once('#') {
        Some((page, fragment)) => (page, Some(fragment)),
        None => (target, None),
    };
    let mut href = page.to_owned();
    if !page.is_empty() && !extension.is_empty() && !page.ends_with(extension) {
        href.push_str(extension);
    }
    if let Some(fragment) = fragment {
        href.push('#');
        href.push_str(fragment);
    }
    href
}
