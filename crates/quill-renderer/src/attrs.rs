//! Permissive attribute-bag parser.
//!
//! Fences, headings, imports and comment directives all carry a trailing
//! attribute block such as `{cmd=python id="x" hide .wide #intro}`. This module
//! parses that block into an [`Attributes`] map of JSON values.
//!
//! Accepted tokens, separated by whitespace or commas:
//!
//! - `#id` sets `id`
//! - `.name` appends to `class`
//! - `key=value` or `key:value`
//! - bare `key` sets `key` to `true`
//!
//! Values may be quoted strings, JSON arrays or objects, `true`/`false`/`null`,
//! numbers, or bare words (taken as strings). A JSON value that fails to
//! decode is dropped without error. Only an unterminated quote or bracket is
//! reported as an [`AttributeError`].

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error parsing an attribute block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    /// A quoted string was never closed.
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    /// A `[` or `{` value was never closed.
    #[error("unterminated `{open}` starting at offset {offset}")]
    UnterminatedGroup {
        /// Opening character.
        open: char,
        /// Byte offset of the opening character.
        offset: usize,
    },
}

/// Parsed attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an attribute block, with or without surrounding braces.
    pub fn parse(input: &str) -> Result<Self, AttributeError> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed);
        let offset = input.len() - input.trim_start().len() + usize::from(body.len() != trimmed.len());
        Scanner::new(body, offset).parse()
    }

    /// Get a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a value as a string. Numbers and booleans are stringified.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Interpret a value as a flag: `true`, `"true"` and non-zero numbers are set.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        }
    }

    /// Get a value as an unsigned integer.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Get a value as a signed integer.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn push_class(&mut self, class: &str) {
        match self.0.get_mut("class") {
            Some(Value::String(existing)) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(class);
            }
            _ => {
                self.0.insert("class".to_owned(), Value::String(class.to_owned()));
            }
        }
    }

    /// Serialize back into a `{key=value ...}` block that [`Attributes::parse`] accepts.
    #[must_use]
    pub fn to_info_string(&self) -> String {
        let mut out = String::from("{");
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            write!(out, "{key}={value}").unwrap();
        }
        out.push('}');
        out
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Split a line into its content and a trailing `{...}` attribute block.
///
/// Returns `None` when the line does not end with a balanced block. Braces
/// inside quoted strings are ignored.
#[must_use]
pub fn split_trailing_block(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_end();
    if !trimmed.ends_with('}') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = None;
    let bytes: Vec<(usize, char)> = trimmed.char_indices().collect();
    for &(i, c) in bytes.iter().rev() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '}' => depth += 1,
            '{' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    start = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let start = start?;
    Some((&trimmed[..start], &trimmed[start..]))
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, base: usize) -> Self {
        Self { src, pos: 0, base }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_separators(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn parse(mut self) -> Result<Attributes, AttributeError> {
        let mut attrs = Attributes::new();
        loop {
            self.skip_separators();
            let Some(c) = self.peek() else {
                return Ok(attrs);
            };
            match c {
                '#' => {
                    self.bump();
                    let id = self.word();
                    if !id.is_empty() {
                        attrs.insert("id", id);
                    }
                }
                '.' => {
                    self.bump();
                    let class = self.word();
                    if !class.is_empty() {
                        attrs.push_class(class);
                    }
                }
                _ => {
                    let key = self.key();
                    if key.is_empty() {
                        // Stray punctuation such as a lone `=`.
                        self.bump();
                        continue;
                    }
                    let key = key.trim_matches(|c| c == '"' || c == '\'').to_owned();
                    if matches!(self.peek(), Some('=' | ':')) {
                        self.bump();
                        if let Some(value) = self.value()? {
                            if key == "class" {
                                if let Value::String(s) = &value {
                                    attrs.push_class(s);
                                    continue;
                                }
                            }
                            attrs.insert(key, value);
                        }
                    } else {
                        attrs.insert(key, true);
                    }
                }
            }
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn key(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' || c == '=' || c == ':' {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn value(&mut self) -> Result<Option<Value>, AttributeError> {
        match self.peek() {
            None => Ok(Some(Value::String(String::new()))),
            Some(q @ ('"' | '\'')) => self.quoted(q).map(|s| Some(Value::String(s))),
            Some(open @ ('[' | '{')) => {
                let raw = self.group(open)?;
                Ok(serde_json::from_str(raw).ok())
            }
            Some(_) => {
                let raw = self.word();
                Ok(Some(bare_value(raw)))
            }
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, AttributeError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => break,
                },
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(AttributeError::UnterminatedString(self.base + start))
    }

    fn group(&mut self, open: char) -> Result<&'a str, AttributeError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.bump() {
            if let Some(q) = quote {
                if c == '\\' {
                    self.bump();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&self.src[start..self.pos]);
                    }
                }
                _ => {}
            }
        }
        Err(AttributeError::UnterminatedGroup {
            open,
            offset: self.base + start,
        })
    }
}

fn bare_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => match serde_json::from_str::<serde_json::Number>(raw) {
            Ok(n) => Value::Number(n),
            Err(_) => Value::String(raw.to_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(input: &str) -> Attributes {
        Attributes::parse(input).unwrap()
    }

    #[test]
    fn test_key_value_forms() {
        let attrs = parse(r#"{cmd=python id:"chunk-1" hide}"#);
        assert_eq!(attrs.get("cmd"), Some(&json!("python")));
        assert_eq!(attrs.get("id"), Some(&json!("chunk-1")));
        assert_eq!(attrs.get("hide"), Some(&json!(true)));
    }

    #[test]
    fn test_shorthand_id_and_classes() {
        let attrs = parse("{#intro .wide .dark class=x}");
        assert_eq!(attrs.get_str("id").as_deref(), Some("intro"));
        assert_eq!(attrs.get_str("class").as_deref(), Some("wide dark x"));
    }

    #[test]
    fn test_scalar_values() {
        let attrs = parse("a=1 b=2.5 c=false d=null e=word f='single quoted'");
        assert_eq!(attrs.get("a"), Some(&json!(1)));
        assert_eq!(attrs.get("b"), Some(&json!(2.5)));
        assert_eq!(attrs.get("c"), Some(&json!(false)));
        assert_eq!(attrs.get("d"), Some(&Value::Null));
        assert_eq!(attrs.get("e"), Some(&json!("word")));
        assert_eq!(attrs.get("f"), Some(&json!("single quoted")));
    }

    #[test]
    fn test_json_values() {
        let attrs = parse(r#"{args=["-c", "print(1)"], env={"A": "b"}}"#);
        assert_eq!(attrs.get("args"), Some(&json!(["-c", "print(1)"])));
        assert_eq!(attrs.get("env"), Some(&json!({"A": "b"})));
    }

    #[test]
    fn test_malformed_json_dropped() {
        let attrs = parse("{args=[1, 2,] cmd=sh}");
        assert!(!attrs.contains_key("args"));
        assert_eq!(attrs.get_str("cmd").as_deref(), Some("sh"));
    }

    #[test]
    fn test_commas_separate() {
        let attrs = parse(r#"{"cmd":"node", "hide":true}"#);
        assert_eq!(attrs.get_str("cmd").as_deref(), Some("node"));
        assert!(attrs.flag("hide"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Attributes::parse(r#"{id="open}"#).unwrap_err();
        assert!(matches!(err, AttributeError::UnterminatedString(_)));
    }

    #[test]
    fn test_unterminated_group() {
        let err = Attributes::parse("args=[1, 2").unwrap_err();
        assert!(matches!(err, AttributeError::UnterminatedGroup { open: '[', .. }));
    }

    #[test]
    fn test_escaped_quote() {
        let attrs = parse(r#"title="say \"hi\"""#);
        assert_eq!(attrs.get_str("title").as_deref(), Some(r#"say "hi""#));
    }

    #[test]
    fn test_flag_and_numbers() {
        let attrs = parse("a=true b=\"true\" c=0 d=3 e=\"7\"");
        assert!(attrs.flag("a"));
        assert!(attrs.flag("b"));
        assert!(!attrs.flag("c"));
        assert!(attrs.flag("d"));
        assert!(!attrs.flag("missing"));
        assert_eq!(attrs.get_u64("e"), Some(7));
        assert_eq!(attrs.get_i64("d"), Some(3));
    }

    #[test]
    fn test_info_string_reparses() {
        let attrs = parse(r#"{cmd=python id="a b" args=["x"] code_chunk_offset=2}"#);
        let info = attrs.to_info_string();
        assert_eq!(
            info,
            r#"{args=["x"] cmd="python" code_chunk_offset=2 id="a b"}"#
        );
        assert_eq!(parse(&info), attrs);
    }

    #[test]
    fn test_empty() {
        assert!(parse("").is_empty());
        assert!(parse("{}").is_empty());
        assert_eq!(Attributes::new().to_info_string(), "{}");
    }

    #[test]
    fn test_split_trailing_block() {
        assert_eq!(
            split_trailing_block("## Title {#x .y}"),
            Some(("## Title ", "{#x .y}"))
        );
        assert_eq!(
            split_trailing_block(r#"@import "a.md" {title="}"}"#),
            Some((r#"@import "a.md" "#, r#"{title="}"}"#))
        );
        assert_eq!(split_trailing_block("## Title"), None);
        assert_eq!(split_trailing_block("text }"), None);
    }
}
