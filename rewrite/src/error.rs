//! Errors surfaced by the rewrite engine.

use thiserror::Error;

use eca_types::{RewriteId, TextRange};

/// Why a trigger did not produce a session.
///
/// Messages are shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("No active editor")]
    NoDocument,
    #[error("ECA server is not running yet. Please wait until it starts.")]
    Disconnected,
    #[error("Select a range to rewrite.")]
    EmptySelection,
    #[error("The selection is outside the document.")]
    OutOfRange,
    #[error("A rewrite is already running on this selection.")]
    Overlapping(RewriteId),
    #[error("Rewrite failed to start: {0}")]
    Backend(String),
}

/// Why an accept or reject command was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("rewrite {0} is no longer active")]
    UnknownSession(RewriteId),
    #[error("rewrite {0} has not finished yet")]
    NotFinished(RewriteId),
}

/// An editable surface declined a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("range {}..{} is outside the document", .0.start(), .0.end())]
    OutOfRange(TextRange),
    #[error("edit rejected: {0}")]
    Rejected(String),
}

/// The backend could not accept a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure inside the Streaming Applier; the caller terminates the session.
#[derive(Debug, Error)]
pub(crate) enum ApplyError {
    #[error("original text not found near the anchor")]
    AnchorLost,
    #[error(transparent)]
    Edit(#[from] EditError),
}
