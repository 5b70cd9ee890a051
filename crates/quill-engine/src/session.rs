//! Serialized state commits for one document.
//!
//! A host may start a new parse while an older one is still running. Each
//! parse takes a [`ParseTicket`] when it starts; only the most recently issued
//! ticket may commit its state. Older results are still returned to their
//! caller but never replace newer state.

use std::sync::{Arc, Mutex};

use crate::engine::{Engine, ParseOutput, ParseRequest};
use crate::error::EngineError;
use crate::state::RenderState;

/// Lifecycle of a document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No parse has run yet.
    Idle,
    /// A parse is in flight.
    Parsing,
    /// The latest parse has been committed.
    Rendered,
}

/// Proof that a parse was started, ordered by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseTicket {
    generation: u64,
}

struct Inner {
    phase: SessionPhase,
    state: Arc<RenderState>,
    issued: u64,
}

/// Owns the committed [`RenderState`] of one document.
pub struct DocumentSession {
    inner: Mutex<Inner>,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSession {
    /// Create an idle session with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: SessionPhase::Idle,
                state: Arc::new(RenderState::default()),
                issued: 0,
            }),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().unwrap().phase
    }

    /// Last committed state.
    #[must_use]
    pub fn state(&self) -> Arc<RenderState> {
        Arc::clone(&self.inner.lock().unwrap().state)
    }

    /// Start a parse, superseding any parse in flight.
    ///
    /// Returns the ticket and the state the parse should build on.
    pub fn begin(&self) -> (ParseTicket, Arc<RenderState>) {
        let mut inner = self.inner.lock().unwrap();
        inner.issued += 1;
        inner.phase = SessionPhase::Parsing;
        (
            ParseTicket {
                generation: inner.issued,
            },
            Arc::clone(&inner.state),
        )
    }

    /// Swap in the state produced under `ticket`.
    ///
    /// Returns `false` and drops `state` when a newer parse has begun since.
    pub fn commit(&self, ticket: ParseTicket, state: RenderState) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if ticket.generation != inner.issued {
            tracing::debug!(
                ticket = ticket.generation,
                latest = inner.issued,
                "Discarding superseded parse"
            );
            return false;
        }
        inner.state = Arc::new(state);
        inner.phase = SessionPhase::Rendered;
        true
    }

    /// Abandon the parse started under `ticket`, keeping the committed state.
    pub fn abort(&self, ticket: ParseTicket) {
        let mut inner = self.inner.lock().unwrap();
        if ticket.generation == inner.issued {
            inner.phase = if inner.state.html.is_empty() && inner.state.headings.is_empty() {
                SessionPhase::Idle
            } else {
                SessionPhase::Rendered
            };
        }
    }

    /// Parse with `engine` and commit the result.
    ///
    /// The returned output has `committed == false` when the parse was
    /// superseded while it ran.
    pub fn parse<L: quill_import::FileLoader>(
        &self,
        engine: &Engine<L>,
        request: &ParseRequest<'_>,
    ) -> Result<ParseOutput, EngineError> {
        let (ticket, previous) = self.begin();
        match engine.parse(request, &previous) {
            Ok((mut output, state)) => {
                output.committed = self.commit(ticket, state);
                Ok(output)
            }
            Err(e) => {
                self.abort(ticket);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(DocumentSession: Send, Sync);

    fn state(html: &str) -> RenderState {
        RenderState {
            html: html.to_owned(),
            ..RenderState::default()
        }
    }

    #[test]
    fn test_phases() {
        let session = DocumentSession::new();
        assert_eq!(session.phase(), SessionPhase::Idle);

        let (ticket, _) = session.begin();
        assert_eq!(session.phase(), SessionPhase::Parsing);

        assert!(session.commit(ticket, state("<p>a</p>")));
        assert_eq!(session.phase(), SessionPhase::Rendered);
        assert_eq!(session.state().html, "<p>a</p>");
    }

    #[test]
    fn test_superseded_parse_not_committed() {
        let session = DocumentSession::new();
        let (old, _) = session.begin();
        let (new, _) = session.begin();

        assert!(session.commit(new, state("new")));
        assert!(!session.commit(old, state("old")));
        assert_eq!(session.state().html, "new");
    }

    #[test]
    fn test_old_commit_before_new_finishes_is_dropped() {
        let session = DocumentSession::new();
        let (old, _) = session.begin();
        let (_new, _) = session.begin();

        assert!(!session.commit(old, state("old")));
        assert_eq!(session.state().html, "");
        assert_eq!(session.phase(), SessionPhase::Parsing);
    }

    #[test]
    fn test_begin_hands_out_committed_state() {
        let session = DocumentSession::new();
        let (ticket, _) = session.begin();
        session.commit(ticket, state("one"));

        let (_, previous) = session.begin();
        assert_eq!(previous.html, "one");
    }

    #[test]
    fn test_abort_restores_phase() {
        let session = DocumentSession::new();
        let (ticket, _) = session.begin();
        session.abort(ticket);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }
}
