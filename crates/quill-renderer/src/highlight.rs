//! Syntax highlighting for fenced code via syntect.
//!
//! Output uses CSS classes so the theme is chosen by stylesheet; see
//! [`theme_css`].

use std::sync::LazyLock;

use syntect::highlighting::ThemeSet;
use syntect::html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Normalize a fence language name.
///
/// Maps common aliases onto one canonical name used for the `language-*` class.
#[must_use]
pub fn normalize_language(lang: &str) -> String {
    let lower = lang.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "js" | "node" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "py" | "py3" | "python3" => "python",
        "sh" | "bash" | "zsh" | "console" | "shellscript" => "shell",
        "rb" => "ruby",
        "rs" => "rust",
        "yml" => "yaml",
        "md" => "markdown",
        "c++" | "cxx" | "hpp" => "cpp",
        "cs" | "c#" => "csharp",
        "kt" => "kotlin",
        "tex" => "latex",
        "htm" | "xhtml" => "html",
        "golang" => "go",
        "ps1" => "powershell",
        "objc" => "objectivec",
        _ => return lower,
    };
    canonical.to_owned()
}

/// Syntect lookup tokens for canonical names that syntect knows under another name.
fn syntect_token(canonical: &str) -> &str {
    match canonical {
        "shell" => "sh",
        "javascript" => "js",
        "python" => "py",
        "csharp" => "cs",
        "latex" => "tex",
        "objectivec" => "m",
        other => other,
    }
}

fn find_syntax(lang: &str) -> Option<&'static SyntaxReference> {
    let canonical = normalize_language(lang);
    SYNTAX_SET
        .find_syntax_by_token(lang)
        .or_else(|| SYNTAX_SET.find_syntax_by_token(syntect_token(&canonical)))
        .or_else(|| SYNTAX_SET.find_syntax_by_token(&canonical))
}

/// Highlight code into class-annotated spans.
///
/// Returns `None` when the language is unknown or highlighting fails, so the
/// caller can fall back to escaped text.
#[must_use]
pub fn highlight(lang: &str, code: &str) -> Option<String> {
    let syntax = find_syntax(lang)?;
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            tracing::debug!(lang, error = %e, "Highlighting failed");
            return None;
        }
    }
    Some(generator.finalize())
}

/// Stylesheet for a built-in highlighting theme.
#[must_use]
pub fn theme_css(theme_name: &str) -> Option<String> {
    let theme = THEME_SET.themes.get(theme_name)?;
    match css_for_theme_with_class_style(theme, ClassStyle::Spaced) {
        Ok(css) => Some(css),
        Err(e) => {
            tracing::warn!(theme = theme_name, error = %e, "Failed to build theme CSS");
            None
        }
    }
}
