//! `@import` expansion.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use quill_diagrams::{DiagramLanguage, page_images_markdown, short_hash};
use quill_renderer::markers::{error_block, image_markdown};
use quill_renderer::options::{ImageOptions, ImportOptions};
use quill_renderer::{Attributes, escape_html};

use crate::csv::csv_to_markdown;
use crate::error::ImportError;
use crate::loader::{FileLoader, is_remote};
use crate::transformer::{MAX_IMPORT_DEPTH, Scan, TransformOptions};

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ico", "apng", "avif",
];

/// Keys that only steer the import itself.
const IMPORT_KEYS: &[&str] = &["line_begin", "line_end", "code_block", "as"];

impl<L: FileLoader> Scan<'_, '_, L> {
    /// Expand an `@import` directive (the text after the keyword).
    pub(crate) fn import(&mut self, directive: &str) {
        self.anchor();
        let fragment = parse_directive(directive)
            .ok_or_else(|| ImportError::Unsupported(format!("malformed @import `{directive}`")))
            .and_then(|(path, block)| {
                let attrs = if block.is_empty() {
                    Attributes::new()
                } else {
                    Attributes::parse(block)?
                };
                self.import_fragment(path, attrs)
            });

        match fragment {
            Ok(fragment) => self.out.output.push_str(&fragment),
            Err(e) => {
                let message = format!("@import {directive}: {e}");
                tracing::warn!(line = self.line_no + 1, error = %e, "Import failed");
                self.out.output.push_str(&error_block(&message));
                self.out.output.push_str("\n\n");
                self.out.warnings.push(message);
            }
        }
    }

    fn import_fragment(&mut self, path: &str, mut attrs: Attributes) -> Result<String, ImportError> {
        if path == "[TOC]" {
            attrs.insert("cmd", "toc");
            attrs.insert("hide", true);
            return Ok(format!("```text {}\n```\n", attrs.to_info_string()));
        }

        let location = self.resolve(path);
        let extension = extension(path);
        let import = ImportOptions::from_attrs(&attrs);
        for key in IMPORT_KEYS {
            attrs.remove(key);
        }

        if !import.code_block {
            if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
                return Ok(self.image(path, &location, &attrs));
            }
            if extension == "pdf" {
                return self.pdf(&location);
            }
            if self.options.for_preview
                && matches!(extension.as_str(), "css" | "less" | "scss" | "sass" | "js")
            {
                if !self.out.js_and_css_files.contains(&location) {
                    self.out.js_and_css_files.push(location);
                }
                return Ok(String::new());
            }
        }

        let content = self.transformer.load(&location, self.cache)?;
        let content = import.slice_lines(&content);

        if import.code_block || import.cmd {
            let language = import.as_language.unwrap_or_else(|| language_of(&extension));
            return Ok(self.code_fence(&language, &content, attrs, import.cmd));
        }
        if let Some(language) = import.as_language {
            return Ok(self.code_fence(&language, &content, attrs, false));
        }

        match extension.as_str() {
            "md" | "markdown" => self.markdown(&location, &content),
            "csv" => Ok(format!("\n{}\n", csv_to_markdown(&content))),
            "css" => Ok(format!("<style>\n{}\n</style>\n\n", content.trim_end())),
            "less" => {
                tracing::warn!(location = %location, "LESS stylesheet inlined without compiling");
                self.out
                    .warnings
                    .push(format!("{location}: LESS is not compiled; inlined as plain CSS"));
                Ok(format!("<style>\n{}\n</style>\n\n", content.trim_end()))
            }
            "scss" | "sass" => {
                let css = compile_stylesheet(&location, &content, &extension)?;
                Ok(format!("<style>\n{}\n</style>\n\n", css.trim_end()))
            }
            "js" => Ok(format!("<script>\n{}\n</script>\n\n", content.trim_end())),
            "html" | "htm" => Ok(with_newline(content)),
            _ => match DiagramLanguage::from_extension(&extension) {
                Some(diagram) => Ok(fence(diagram.fence_language(), &attrs, &content)),
                None => Ok(fence(&language_of(&extension), &Attributes::new(), &content)),
            },
        }
    }

    /// Resolve an import path against the whitelist, project root or file directory.
    fn resolve(&self, path: &str) -> String {
        if self
            .options
            .protocols_whitelist
            .iter()
            .any(|p| path.starts_with(p.as_str()))
        {
            return path.to_owned();
        }
        match path.strip_prefix('/') {
            Some(rooted) => self.options.project_directory_path.join(rooted),
            None => self.options.file_directory_path.join(path),
        }
        .display()
        .to_string()
    }

    fn image(&self, path: &str, location: &str, attrs: &Attributes) -> String {
        // Preview links point at the file itself; export keeps what the author
        // wrote unless the image sits next to a nested import.
        let remote = is_remote(path);
        let mut src = if !remote
            && (self.options.for_preview
                || (self.options.is_nested_import && !path.starts_with('/')))
        {
            location.to_owned()
        } else {
            path.to_owned()
        };
        if self.options.for_preview && !remote {
            write!(src, "?{}", cache_buster()).unwrap();
        }

        let image = ImageOptions::from_attrs(attrs);
        let alt = image.alt.as_deref().unwrap_or("");
        if !image.needs_html() {
            return format!("{}\n", image_markdown(alt, &src));
        }
        let mut tag = format!(r#"<img src="{}" alt="{}""#, escape_html(&src), escape_html(alt));
        for (name, value) in [
            ("width", &image.width),
            ("height", &image.height),
            ("class", &image.class),
            ("id", &image.id),
            ("title", &image.title),
        ] {
            if let Some(value) = value {
                write!(tag, r#" {name}="{}""#, escape_html(value)).unwrap();
            }
        }
        tag.push_str(">\n");
        tag
    }

    /// Convert a local PDF into page images.
    ///
    /// The generated markdown is cached under the PDF location so export
    /// routines can force regeneration by invalidating `.pdf` entries.
    fn pdf(&mut self, location: &str) -> Result<String, ImportError> {
        if is_remote(location) {
            return Err(ImportError::Unsupported(format!(
                "remote PDF imports are not supported: {location}"
            )));
        }
        if let Some(markdown) = self.cache.get(location) {
            return Ok(markdown.to_owned());
        }
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        if !path.exists() {
            return Err(ImportError::NotFound(location.to_owned()));
        }
        let pages = self.transformer.latex.pdf_to_svgs(
            path,
            self.options.image_directory_path,
            self.options.image_file_prefix,
        )?;
        let markdown = page_images_markdown(&pages, self.options.image_link_base);
        self.cache.insert(location, markdown.clone());
        Ok(markdown)
    }

    /// Recursively transform imported markdown.
    fn markdown(&mut self, location: &str, content: &str) -> Result<String, ImportError> {
        if self.stack.iter().any(|l| l == location) {
            return Err(ImportError::Cycle(location.to_owned()));
        }
        if self.stack.len() >= MAX_IMPORT_DEPTH {
            return Err(ImportError::TooDeep(MAX_IMPORT_DEPTH));
        }

        let directory = parent_directory(location);
        let options = TransformOptions {
            file_directory_path: &directory,
            is_nested_import: true,
            ..*self.options
        };

        self.stack.push(location.to_owned());
        let nested = self
            .transformer
            .transform_nested(content, &options, self.cache, self.stack);
        self.stack.pop();

        self.out.headings.extend(nested.headings);
        self.out.warnings.extend(nested.warnings);
        self.out.toc_bracket_found |= nested.toc_bracket_found;
        for file in nested.js_and_css_files {
            if !self.out.js_and_css_files.contains(&file) {
                self.out.js_and_css_files.push(file);
            }
        }
        Ok(with_newline(nested.output))
    }

    /// Fence for a text import, numbered when executable.
    fn code_fence(&mut self, language: &str, content: &str, mut attrs: Attributes, cmd: bool) -> String {
        if !cmd {
            return fence(language, &Attributes::new(), content);
        }
        if !attrs.contains_key("id") {
            attrs.insert("id", short_hash(content));
        }
        if !self.options.is_nested_import {
            attrs.insert("code_chunk_offset", self.chunk_offset);
            self.chunk_offset += 1;
        }
        fence(language, &attrs, content)
    }
}

/// Split `"path" {attrs}`, `'path' {attrs}` or `path {attrs}`.
fn parse_directive(directive: &str) -> Option<(&str, &str)> {
    let directive = directive.trim();
    let (path, rest) = match directive.chars().next()? {
        quote @ ('"' | '\'') => {
            let end = directive[1..].find(quote)? + 1;
            (&directive[1..end], &directive[end + 1..])
        }
        _ => directive
            .split_once(char::is_whitespace)
            .unwrap_or((directive, "")),
    };
    if path.is_empty() {
        return None;
    }
    Some((path, rest.trim()))
}

/// Lowercase extension of a path, ignoring query and fragment.
fn extension(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn language_of(extension: &str) -> String {
    if extension.is_empty() {
        "text".to_owned()
    } else {
        extension.to_owned()
    }
}

fn parent_directory(location: &str) -> PathBuf {
    Path::new(location)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Fenced block, with a fence longer than any backtick run in the content.
fn fence(language: &str, attrs: &Attributes, content: &str) -> String {
    let longest = content
        .lines()
        .map(|line| line.trim_start().bytes().take_while(|&b| b == b'`').count())
        .max()
        .unwrap_or(0);
    let marker = "`".repeat(longest.max(2) + 1);
    let info = if attrs.is_empty() {
        language.to_owned()
    } else {
        format!("{language} {}", attrs.to_info_string())
    };
    format!("{marker}{info}\n{}{marker}\n", with_newline(content.to_owned()))
}

fn with_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn compile_stylesheet(location: &str, source: &str, extension: &str) -> Result<String, ImportError> {
    let syntax = if extension == "sass" {
        grass::InputSyntax::Sass
    } else {
        grass::InputSyntax::Scss
    };
    let mut options = grass::Options::default().input_syntax(syntax);
    let directory = parent_directory(location);
    if !is_remote(location) {
        options = options.load_path(&directory);
    }
    grass::from_string(source, &options).map_err(|e| ImportError::Stylesheet {
        location: location.to_owned(),
        message: e.to_string(),
    })
}

fn cache_buster() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_directive() {
        assert_eq!(parse_directive("\"a b.md\" {x=1}"), Some(("a b.md", "{x=1}")));
        assert_eq!(parse_directive("'a.md'"), Some(("a.md", "")));
        assert_eq!(parse_directive("a.md {x}"), Some(("a.md", "{x}")));
        assert_eq!(parse_directive("\"unterminated"), None);
        assert_eq!(parse_directive("\"\""), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("img/Photo.PNG?v=2"), "png");
        assert_eq!(extension("Makefile"), "");
        assert_eq!(extension("https://x.io/a.puml#frag"), "puml");
    }

    #[test]
    fn test_fence_outgrows_content_backticks() {
        assert_eq!(
            fence("md", &Attributes::new(), "````\ninner\n````"),
            "`````md\n````\ninner\n````\n`````\n"
        );
        assert_eq!(fence("rs", &Attributes::new(), "x"), "```rs\nx\n```\n");
    }
}
