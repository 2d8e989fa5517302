//! Edit provenance and document change notifications.
//!
//! Every mutation the rewrite engine issues carries an [`EditOrigin`] naming
//! the session that produced it. Editable surfaces echo that origin back on the
//! resulting [`DocumentChange`], so interference detection can tell the engine's
//! own writes from the user's without any time-based suppression window.

use crate::ids::{DocumentUri, RewriteId};
use crate::text::{TextRange, char_len};

/// Who produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EditOrigin {
    /// The user, another extension, or anything else outside the engine.
    #[default]
    External,
    /// A write issued on behalf of the given rewrite session.
    Rewrite(RewriteId),
}

impl EditOrigin {
    /// The session behind an engine edit.
    #[must_use]
    pub fn session(self) -> Option<RewriteId> {
        match self {
            Self::External => None,
            Self::Rewrite(id) => Some(id),
        }
    }
}

/// How an edit participates in the surface's undo history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOptions {
    pub origin: EditOrigin,
    pub undo_stop_before: bool,
    pub undo_stop_after: bool,
}

impl EditOptions {
    /// Opens a new undo group before the edit (the first write of a session).
    #[must_use]
    pub fn opening(id: RewriteId) -> Self {
        Self {
            origin: EditOrigin::Rewrite(id),
            undo_stop_before: true,
            undo_stop_after: false,
        }
    }

    /// Joins the current undo group (streamed chunks).
    #[must_use]
    pub fn streaming(id: RewriteId) -> Self {
        Self {
            origin: EditOrigin::Rewrite(id),
            undo_stop_before: false,
            undo_stop_after: false,
        }
    }

    /// Closes the current undo group after the edit (rollback, commit).
    #[must_use]
    pub fn closing(id: RewriteId) -> Self {
        Self {
            origin: EditOrigin::Rewrite(id),
            undo_stop_before: false,
            undo_stop_after: true,
        }
    }

    /// A plain user edit with its own undo group.
    #[must_use]
    pub fn external() -> Self {
        Self {
            origin: EditOrigin::External,
            undo_stop_before: true,
            undo_stop_after: true,
        }
    }
}

/// One replaced span, expressed in the coordinates of the document right
/// before this edit: after every preceding edit of the same
/// [`DocumentChange`] has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub range: TextRange,
    pub text: String,
}

impl TextChange {
    /// Signed change in document length caused by this edit.
    #[must_use]
    pub fn len_delta(&self) -> isize {
        char_len(&self.text) as isize - self.range.len() as isize
    }
}

/// A change notification emitted by an editable surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub uri: DocumentUri,
    pub origin: EditOrigin,
    /// Applied in order; each range already accounts for the ones before it.
    pub changes: Vec<TextChange>,
}
