//! Typed views over an [`Attributes`] bag.
//!
//! One permissive parser feeds several fence and directive kinds. Each kind
//! reads only the keys it understands; unknown keys stay in the bag.

use serde_json::Value;

use crate::attrs::Attributes;

/// What to do with a code chunk's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkOutput {
    /// Insert the result as markdown text.
    #[default]
    Text,
    /// Result is HTML.
    Html,
    /// Result is markdown.
    Markdown,
    /// Wrap the result in a plain code fence.
    Plain,
    /// Drop the result.
    None,
}

impl ChunkOutput {
    fn parse(s: &str) -> Self {
        match s {
            "html" => Self::Html,
            "markdown" => Self::Markdown,
            "none" => Self::None,
            "txt" | "text" => Self::Text,
            _ => Self::Plain,
        }
    }
}

/// Options of an executable code chunk fence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeChunkOptions {
    /// Interpreter command. `true` means "use the fence language".
    pub cmd: String,
    /// Chunk id.
    pub id: Option<String>,
    /// Hide the source fence.
    pub hide: bool,
    /// How to insert the result.
    pub output: ChunkOutput,
    /// Result contains matplotlib output.
    pub matplotlib: bool,
    /// Source is LaTeX to compile.
    pub latex: bool,
    /// Ordinal among top-level chunks.
    pub code_chunk_offset: Option<u64>,
}

impl CodeChunkOptions {
    /// Read chunk options. Returns `None` when the bag has no `cmd`.
    #[must_use]
    pub fn from_attrs(attrs: &Attributes, language: &str) -> Option<Self> {
        let cmd = match attrs.get("cmd")? {
            Value::Bool(true) => language.to_owned(),
            Value::Bool(false) | Value::Null => return None,
            other => match other.as_str() {
                Some(s) => s.to_owned(),
                None => other.to_string(),
            },
        };
        let latex = cmd == "latex" || cmd.ends_with("tex") || language == "latex";
        Some(Self {
            cmd,
            id: attrs.get_str("id"),
            hide: attrs.flag("hide"),
            output: attrs
                .get_str("output")
                .map_or(ChunkOutput::Text, |s| ChunkOutput::parse(&s)),
            matplotlib: attrs.flag("matplotlib"),
            latex,
            code_chunk_offset: attrs.get_u64("code_chunk_offset"),
        })
    }
}

/// Horizontal alignment for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// Left aligned.
    Left,
    /// Centered.
    Center,
    /// Right aligned.
    Right,
}

/// Options of a diagram fence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagramOptions {
    /// Keep the fence as a code block instead of rendering it.
    pub code_block: bool,
    /// Fixed output filename (without directory).
    pub filename: Option<String>,
    /// Alignment wrapper.
    pub align: Option<Align>,
    /// Alt text for file output.
    pub alt: Option<String>,
}

impl DiagramOptions {
    /// Read diagram options.
    #[must_use]
    pub fn from_attrs(attrs: &Attributes) -> Self {
        Self {
            code_block: attrs.flag("code_block"),
            filename: attrs.get_str("filename"),
            align: attrs.get_str("align").and_then(|a| match a.as_str() {
                "left" => Some(Align::Left),
                "center" => Some(Align::Center),
                "right" => Some(Align::Right),
                _ => None,
            }),
            alt: attrs.get_str("alt"),
        }
    }
}

/// Options of an imported image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageOptions {
    /// Width attribute.
    pub width: Option<String>,
    /// Height attribute.
    pub height: Option<String>,
    /// CSS class.
    pub class: Option<String>,
    /// Element id.
    pub id: Option<String>,
    /// Alt text.
    pub alt: Option<String>,
    /// Title attribute.
    pub title: Option<String>,
}

impl ImageOptions {
    /// Read image options.
    #[must_use]
    pub fn from_attrs(attrs: &Attributes) -> Self {
        Self {
            width: attrs.get_str("width"),
            height: attrs.get_str("height"),
            class: attrs.get_str("class"),
            id: attrs.get_str("id"),
            alt: attrs.get_str("alt"),
            title: attrs.get_str("title"),
        }
    }

    /// Whether the image needs an `<img>` tag rather than markdown syntax.
    #[must_use]
    pub fn needs_html(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.class.is_some()
            || self.id.is_some()
            || self.title.is_some()
    }
}

/// Options of a table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocOptions {
    /// Numbered list.
    pub ordered: bool,
    /// Shallowest level included.
    pub depth_from: u8,
    /// Deepest level included.
    pub depth_to: u8,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            ordered: false,
            depth_from: 1,
            depth_to: 6,
        }
    }
}

impl TocOptions {
    /// Read TOC options, falling back to `defaults` for absent keys.
    #[must_use]
    pub fn from_attrs(attrs: &Attributes, defaults: Self) -> Self {
        let level = |key: &str, fallback: u8| {
            attrs
                .get_u64(key)
                .and_then(|v| u8::try_from(v).ok())
                .filter(|v| (1..=6).contains(v))
                .unwrap_or(fallback)
        };
        let ordered = if attrs.contains_key("ordered") {
            attrs.flag("ordered")
        } else {
            defaults.ordered
        };
        Self {
            ordered,
            depth_from: level("depth_from", defaults.depth_from),
            depth_to: level("depth_to", defaults.depth_to),
        }
    }
}

/// Options of an `@import` directive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportOptions {
    /// First line to keep (1-based, inclusive). Negative counts from the end.
    pub line_begin: Option<i64>,
    /// Line to stop before (1-based, exclusive). Negative counts from the end.
    pub line_end: Option<i64>,
    /// Render the file as a code block regardless of extension.
    pub code_block: bool,
    /// Import as an executable chunk.
    pub cmd: bool,
    /// Override the language used for code blocks.
    pub as_language: Option<String>,
}

impl ImportOptions {
    /// Read import options.
    #[must_use]
    pub fn from_attrs(attrs: &Attributes) -> Self {
        Self {
            line_begin: attrs.get_i64("line_begin"),
            line_end: attrs.get_i64("line_end"),
            code_block: attrs.flag("code_block"),
            cmd: attrs.contains_key("cmd") && attrs.get("cmd") != Some(&Value::Bool(false)),
            as_language: attrs.get_str("as"),
        }
    }

    /// Apply `line_begin` / `line_end` to text.
    #[must_use]
    pub fn slice_lines(&self, text: &str) -> String {
        if self.line_begin.is_none() && self.line_end.is_none() {
            return text.to_owned();
        }
        let lines: Vec<&str> = text.lines().collect();
        let len = i64::try_from(lines.len()).unwrap_or(i64::MAX);
        let resolve = |v: i64| -> usize {
            let idx = if v < 0 { len + v } else { v };
            usize::try_from(idx.clamp(0, len)).unwrap_or(0)
        };
        let one_based = |v: i64| if v > 0 { v - 1 } else { v };
        let begin = self.line_begin.map_or(0, |b| resolve(one_based(b)));
        let end = self
            .line_end
            .map_or(lines.len(), |e| resolve(one_based(e)));
        if begin >= end {
            return String::new();
        }
        lines[begin..end].join("\n")
    }
}
