//! Per-rewrite state.

use std::fmt;
use std::time::Instant;

use eca_types::text::{TextRange, char_len};
use eca_types::{DocumentUri, RewriteId};

/// Where a session is in its life.
///
/// `Terminated` is never stored in the registry: leaving the registry is the
/// termination. Lookups for an id that is no longer registered report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Prompt sent, original text still in the document.
    Requesting,
    /// Original text deleted, generated text flowing in.
    Streaming,
    /// Backend done; waiting for accept or reject.
    Finished,
    Terminated,
}

impl Lifecycle {
    /// Whether the original text has been swapped for generated text.
    #[must_use]
    pub fn has_started(self) -> bool {
        matches!(self, Self::Streaming | Self::Finished)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
            Self::Terminated => "terminated",
        })
    }
}

/// Debounce state of the pending-text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum FlushState {
    #[default]
    Idle,
    Scheduled {
        due: Instant,
    },
}

#[derive(Debug)]
pub struct RewriteSession {
    id: RewriteId,
    uri: DocumentUri,
    /// Left edge of the owned region. Fixed when streaming starts; moves only
    /// when an edit before it shifts the text.
    pub(crate) anchor: usize,
    /// Chars of generated text in the document, starting at `anchor`.
    pub(crate) applied: usize,
    original: String,
    original_len: usize,
    /// Generated text not yet in the document.
    pub(crate) pending: String,
    pub(crate) state: Lifecycle,
    pub(crate) flush: FlushState,
}

impl RewriteSession {
    pub(crate) fn new(id: RewriteId, uri: DocumentUri, anchor: usize, original: String) -> Self {
        Self {
            id,
            uri,
            anchor,
            applied: 0,
            original_len: char_len(&original),
            original,
            pending: String::new(),
            state: Lifecycle::Requesting,
            flush: FlushState::Idle,
        }
    }

    #[must_use]
    pub fn id(&self) -> RewriteId {
        self.id
    }

    #[must_use]
    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    #[must_use]
    pub fn anchor(&self) -> usize {
        self.anchor
    }

    #[must_use]
    pub fn applied_len(&self) -> usize {
        self.applied
    }

    /// The selected text as it was at trigger time.
    #[must_use]
    pub fn original_text(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub fn pending_text(&self) -> &str {
        &self.pending
    }

    /// Where the original text is expected before streaming starts.
    #[must_use]
    pub fn original_range(&self) -> TextRange {
        TextRange::with_len(self.anchor, self.original_len)
    }

    /// Generated text currently in the document.
    #[must_use]
    pub fn applied_range(&self) -> TextRange {
        TextRange::with_len(self.anchor, self.applied)
    }

    /// The text this session owns: the selection until streaming starts, the
    /// applied text afterwards.
    #[must_use]
    pub fn region(&self) -> TextRange {
        if self.state.has_started() {
            self.applied_range()
        } else {
            self.original_range()
        }
    }

    pub(crate) fn flush_due(&self) -> Option<Instant> {
        match self.flush {
            FlushState::Idle => None,
            FlushState::Scheduled { due } => Some(due),
        }
    }

    pub(crate) fn shift_anchor(&mut self, delta: isize) {
        self.anchor = self.anchor.saturating_add_signed(delta);
    }
}
