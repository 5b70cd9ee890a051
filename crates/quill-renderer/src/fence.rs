//! Line-level code fence tracking.
//!
//! Used by every line scanner in the pipeline (import expansion, diagram
//! splicing, math detection) to leave fenced content alone.

/// Tracks code fence state during line-by-line processing.
///
/// Fences use backticks or tildes (three or more). The closing fence must use
/// the same character and be at least as long as the opening fence.
#[derive(Debug, Default, Clone)]
pub struct FenceTracker {
    fence_char: Option<char>,
    fence_len: usize,
}

impl FenceTracker {
    /// Create a new fence tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if currently inside a fenced code block.
    #[must_use]
    pub fn in_fence(&self) -> bool {
        self.fence_char.is_some()
    }

    /// Update fence state based on a line.
    ///
    /// Returns `true` if the line is a fence marker (opening or closing).
    pub fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();

        if let Some(fence_char) = self.fence_char {
            if is_closing_fence(trimmed, fence_char, self.fence_len) {
                self.fence_char = None;
                self.fence_len = 0;
                return true;
            }
            false
        } else if let Some(open) = OpeningFence::parse(line) {
            self.fence_char = open.marker.chars().next();
            self.fence_len = open.marker.len();
            true
        } else {
            false
        }
    }
}

/// An opening fence line split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningFence<'a> {
    /// Leading whitespace.
    pub indent: &'a str,
    /// The run of fence characters (e.g. "```").
    pub marker: &'a str,
    /// Trimmed info string after the marker.
    pub info: &'a str,
}

impl<'a> OpeningFence<'a> {
    /// Parse an opening fence line, returning `None` for ordinary lines.
    ///
    /// Backtick fences may not carry backticks in their info string.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];
        if indent.len() > 3 {
            return None;
        }
        let first = trimmed.chars().next()?;
        if first != '`' && first != '~' {
            return None;
        }
        let count = trimmed.chars().take_while(|&c| c == first).count();
        if count < 3 {
            return None;
        }
        let info = trimmed[count..].trim();
        if first == '`' && info.contains('`') {
            return None;
        }
        Some(Self {
            indent,
            marker: &trimmed[..count],
            info,
        })
    }

    /// Language token of the info string (first whitespace- or brace-delimited word).
    #[must_use]
    pub fn language(&self) -> &'a str {
        let end = self
            .info
            .find(|c: char| c.is_whitespace() || c == '{')
            .unwrap_or(self.info.len());
        &self.info[..end]
    }

    /// Everything after the language token, trimmed.
    #[must_use]
    pub fn rest(&self) -> &'a str {
        self.info[self.language().len()..].trim()
    }
}

fn is_closing_fence(trimmed: &str, expected_char: char, min_len: usize) -> bool {
    match trimmed.chars().next() {
        Some(c) if c == expected_char => {}
        _ => return false,
    }

    let count = trimmed.chars().take_while(|&c| c == expected_char).count();
    if count < min_len {
        return false;
    }

    trimmed[count..].chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtick_fence() {
        let mut tracker = FenceTracker::new();
        assert!(!tracker.in_fence());

        assert!(tracker.update("```rust"));
        assert!(tracker.in_fence());
        assert!(!tracker.update("fn main() {}"));
        assert!(tracker.update("```"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_tilde_fence_not_closed_by_backticks() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("~~~python"));
        assert!(!tracker.update("```"));
        assert!(tracker.in_fence());
        assert!(tracker.update("~~~~"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_shorter_fence_does_not_close() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("````md"));
        assert!(!tracker.update("```"));
        assert!(tracker.update("````"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_closing_fence_with_info_is_content() {
        let mut tracker = FenceTracker::new();
        tracker.update("```");
        assert!(!tracker.update("```js"));
        assert!(tracker.in_fence());
    }

    #[test]
    fn test_inline_code_not_fence() {
        let mut tracker = FenceTracker::new();
        assert!(!tracker.update("``inline``"));
        assert!(!tracker.update("text ```"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_opening_fence_parts() {
        let fence = OpeningFence::parse("  ```python {cmd=true id=\"a\"}").unwrap();
        assert_eq!(fence.indent, "  ");
        assert_eq!(fence.marker, "```");
        assert_eq!(fence.language(), "python");
        assert_eq!(fence.rest(), "{cmd=true id=\"a\"}");
    }

    #[test]
    fn test_opening_fence_brace_without_space() {
        let fence = OpeningFence::parse("```puml{code_block=true}").unwrap();
        assert_eq!(fence.language(), "puml");
        assert_eq!(fence.rest(), "{code_block=true}");
    }

    #[test]
    fn test_opening_fence_rejects_deep_indent() {
        assert!(OpeningFence::parse("    ```rust").is_none());
    }

    #[test]
    fn test_opening_fence_empty_info() {
        let fence = OpeningFence::parse("~~~").unwrap();
        assert_eq!(fence.language(), "");
        assert_eq!(fence.rest(), "");
    }
}
