//! YAML front matter detection.

use serde::Serialize;
use serde_json::Value;

/// Front matter stripped from the top of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontMatter {
    /// YAML source between the delimiters.
    pub raw: String,
    /// Parsed value, `null` when the YAML is empty or malformed.
    pub data: Value,
}

/// Front matter split from its document.
#[derive(Debug)]
pub(crate) struct Split<'a> {
    pub(crate) front_matter: FrontMatter,
    /// Lines consumed, delimiters included.
    pub(crate) lines: usize,
    pub(crate) body: &'a str,
    /// YAML parse failure, if any.
    pub(crate) error: Option<String>,
}

/// Split `---`-delimited front matter from the start of `text`.
///
/// The block closes with `---` or `...`. Without a closing delimiter the text
/// has no front matter.
pub(crate) fn split(text: &str) -> Option<Split<'_>> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }

    let mut offset = first.len();
    let mut raw = String::new();
    for (index, line) in lines.enumerate() {
        offset += line.len();
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let (data, error) = parse(&raw);
            return Some(Split {
                front_matter: FrontMatter { raw, data },
                lines: index + 2,
                body: &text[offset..],
                error,
            });
        }
        raw.push_str(line);
    }
    None
}

fn parse(raw: &str) -> (Value, Option<String>) {
    if raw.trim().is_empty() {
        return (Value::Null, None);
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value) => (value, None),
        Err(e) => (Value::Null, Some(format!("invalid front matter: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split() {
        let split = split("---\ntitle: Hi\ntags: [a, b]\n---\n# Body\n").unwrap();
        assert_eq!(split.front_matter.raw, "title: Hi\ntags: [a, b]\n");
        assert_eq!(split.front_matter.data["title"], "Hi");
        assert_eq!(split.front_matter.data["tags"][1], "b");
        assert_eq!(split.lines, 4);
        assert_eq!(split.body, "# Body\n");
        assert!(split.error.is_none());
    }

    #[test]
    fn test_dots_close() {
        let split = split("---\na: 1\n...\nrest").unwrap();
        assert_eq!(split.front_matter.data["a"], 1);
        assert_eq!(split.body, "rest");
    }

    #[test]
    fn test_unclosed_is_not_front_matter() {
        assert!(split("---\na: 1\n").is_none());
        assert!(split("# Title\n---\n").is_none());
    }

    #[test]
    fn test_malformed_yaml_reports() {
        let split = split("---\na: [1\n---\n").unwrap();
        assert_eq!(split.front_matter.data, Value::Null);
        assert!(split.error.unwrap().contains("invalid front matter"));
    }

    #[test]
    fn test_empty_block() {
        let split = split("---\n---\nx").unwrap();
        assert_eq!(split.front_matter.data, Value::Null);
        assert_eq!(split.lines, 2);
    }
}
