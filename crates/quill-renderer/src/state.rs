//! Shared state structs for markdown rendering.
//!
//! These structs track context while the renderer walks parser events.

use std::collections::HashMap;

use pulldown_cmark::{Alignment, Event, Parser};
use serde::{Deserialize, Serialize};

/// State for tracking code block rendering.
#[derive(Default)]
pub(crate) struct CodeBlockState {
    active: bool,
    info: Option<String>,
    buffer: String,
}

impl CodeBlockState {
    /// Start a new code block with its fence info string.
    pub(crate) fn start(&mut self, info: Option<String>) {
        self.active = true;
        self.info = info;
        self.buffer.clear();
    }

    /// End the current code block and return (info, content).
    pub(crate) fn end(&mut self) -> (Option<String>, String) {
        self.active = false;
        (self.info.take(), std::mem::take(&mut self.buffer))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

/// State for tracking table rendering.
#[derive(Default)]
pub(crate) struct TableState {
    in_head: bool,
    alignments: Vec<Alignment>,
    cell_index: usize,
}

impl TableState {
    pub(crate) fn start(&mut self, alignments: Vec<Alignment>) {
        self.alignments = alignments;
        self.in_head = false;
        self.cell_index = 0;
    }

    pub(crate) fn start_head(&mut self) {
        self.in_head = true;
        self.cell_index = 0;
    }

    pub(crate) fn end_head(&mut self) {
        self.in_head = false;
    }

    pub(crate) fn start_row(&mut self) {
        self.cell_index = 0;
    }

    pub(crate) fn next_cell(&mut self) {
        self.cell_index += 1;
    }

    pub(crate) fn is_in_head(&self) -> bool {
        self.in_head
    }

    /// Alignment style attribute for the current cell.
    pub(crate) fn current_alignment_style(&self) -> &'static str {
        match self.alignments.get(self.cell_index) {
            Some(Alignment::Left) => r#" style="text-align:left""#,
            Some(Alignment::Center) => r#" style="text-align:center""#,
            Some(Alignment::Right) => r#" style="text-align:right""#,
            Some(Alignment::None) | None => "",
        }
    }
}

/// State for capturing image alt text.
#[derive(Default)]
pub(crate) struct ImageState {
    active: bool,
    alt_text: String,
}

impl ImageState {
    pub(crate) fn start(&mut self) {
        self.active = true;
        self.alt_text.clear();
    }

    pub(crate) fn end(&mut self) -> String {
        self.active = false;
        std::mem::take(&mut self.alt_text)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn push_str(&mut self, text: &str) {
        self.alt_text.push_str(text);
    }
}

/// A heading record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Plain heading text.
    pub content: String,
    /// Heading level (1-6).
    pub level: u8,
    /// Anchor id.
    pub id: String,
}

/// Per-document slug table.
///
/// The first occurrence of a slug is used as-is; the Nth repeat gets `-N`.
#[derive(Debug, Default, Clone)]
pub struct SlugTable {
    counts: HashMap<String, usize>,
}

impl SlugTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a unique id for heading text.
    pub fn assign(&mut self, text: &str) -> String {
        let base_id = slugify(text);
        let count = self.counts.entry(base_id.clone()).or_default();
        let id = match *count {
            0 => base_id,
            n => format!("{base_id}-{n}"),
        };
        *count += 1;
        id
    }
}

struct PendingHeading {
    level: u8,
    explicit_id: Option<String>,
    classes: Vec<String>,
}

/// A heading ready to be written.
pub(crate) struct CompletedHeading {
    pub(crate) level: u8,
    pub(crate) id: String,
    pub(crate) classes: Vec<String>,
    pub(crate) html: String,
}

/// State for tracking headings and their ids.
#[derive(Default)]
pub(crate) struct HeadingState {
    current: Option<PendingHeading>,
    text: String,
    html: String,
    headings: Vec<Heading>,
    slugs: SlugTable,
}

impl HeadingState {
    pub(crate) fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Start tracking a heading.
    ///
    /// An explicit id bypasses the slug table.
    pub(crate) fn start_heading(
        &mut self,
        level: u8,
        explicit_id: Option<String>,
        classes: Vec<String>,
    ) {
        self.current = Some(PendingHeading {
            level,
            explicit_id,
            classes,
        });
        self.text.clear();
        self.html.clear();
    }

    /// Complete the current heading and record it.
    pub(crate) fn complete_heading(&mut self) -> Option<CompletedHeading> {
        let pending = self.current.take()?;
        let text = std::mem::take(&mut self.text);
        let html = std::mem::take(&mut self.html);
        let content = text.trim().to_owned();

        let id = match pending.explicit_id {
            Some(id) => id,
            None => self.slugs.assign(&content),
        };

        self.headings.push(Heading {
            content,
            level: pending.level,
            id: id.clone(),
        });

        Some(CompletedHeading {
            level: pending.level,
            id,
            classes: pending.classes,
            html,
        })
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub(crate) fn push_html(&mut self, html: &str) {
        self.html.push_str(html);
    }

    pub(crate) fn take_headings(&mut self) -> Vec<Heading> {
        std::mem::take(&mut self.headings)
    }
}

/// Convert text to an anchor slug.
///
/// Lowercases letters and digits (any script), collapses whitespace, dashes and
/// underscores into single dashes, and drops other punctuation.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut result = String::new();
    let mut last_was_dash = true;

    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            result.extend(c.to_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && (c.is_whitespace() || c == '-' || c == '_') {
            result.push('-');
            last_was_dash = true;
        }
    }

    if result.ends_with('-') {
        result.pop();
    }

    result
}

/// Plain text of an inline markdown fragment (emphasis, links and code unwrapped).
///
/// Heading records built from source lines use this so their slugs agree with
/// the ids the renderer assigns.
#[must_use]
pub fn inline_plain_text(markdown: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            _ => {}
        }
    }
    out.trim().to_owned()
}

/// Escape HTML special characters.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}
