//! Colored terminal output utilities.

use std::io::{self, Write};

use console::{Style, Term};

/// Terminal output formatter.
///
/// Messages go to stderr; documents go to stdout through [`Output::document`].
pub(crate) struct Output {
    term: Term,
    green: Style,
    yellow: Style,
    red: Style,
}

impl Output {
    /// Create a new output formatter.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
        }
    }

    /// Print an info message.
    pub(crate) fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    /// Print a success message (green).
    pub(crate) fn success(&self, msg: &str) {
        let _ = self.term.write_line(&self.green.apply_to(msg).to_string());
    }

    /// Print a warning message (yellow).
    pub(crate) fn warning(&self, msg: &str) {
        let _ = self.term.write_line(&self.yellow.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Print every pipeline warning.
    pub(crate) fn warnings(&self, warnings: &[String]) {
        for warning in warnings {
            self.warning(&format!("warning: {warning}"));
        }
    }

    /// Write a document to stdout.
    pub(crate) fn document(&self, contents: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(contents.as_bytes())?;
        if !contents.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        stdout.flush()
    }
}
