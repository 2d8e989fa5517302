//! In-memory documents implementing the editable-surface capabilities.
//!
//! Used by the headless CLI host and by tests. Every applied edit is echoed as
//! a [`DocumentChange`] on the workspace's change channel, carrying the
//! [`EditOrigin`] the writer supplied, the same way an editor reports
//! content changes back to the extension that made them.

use std::collections::HashMap;

use tokio::sync::mpsc;

use eca_types::text::{TextRange, byte_index, char_len};
use eca_types::{DocumentChange, DocumentUri, EditOptions, EditOrigin, TextChange};

use crate::error::EditError;
use crate::surface::{EditSurface, Workspace};

/// Edits that revert one undo group, in application order.
#[derive(Debug, Default)]
struct UndoGroup {
    inverses: Vec<TextChange>,
}

#[derive(Debug, Default)]
struct UndoHistory {
    closed: Vec<UndoGroup>,
    open: Option<UndoGroup>,
}

impl UndoHistory {
    fn stop(&mut self) {
        if let Some(group) = self.open.take()
            && !group.inverses.is_empty()
        {
            self.closed.push(group);
        }
    }

    fn record(&mut self, inverse: TextChange) {
        self.open.get_or_insert_with(UndoGroup::default).inverses.push(inverse);
    }
}

#[derive(Debug)]
pub struct MemoryDocument {
    uri: DocumentUri,
    text: String,
    version: u64,
    undo: UndoHistory,
    changes: mpsc::UnboundedSender<DocumentChange>,
    refuse_edits: usize,
}

impl MemoryDocument {
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of undo groups that [`MemoryDocument::undo`] could revert.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.closed.len() + usize::from(self.undo.open.is_some())
    }

    /// Make the next `count` writes through [`EditSurface`] fail, as an editor
    /// does when the document moved under a pending edit.
    pub fn refuse_next_edits(&mut self, count: usize) {
        self.refuse_edits = count;
    }

    /// A user edit in its own undo group.
    pub fn edit(&mut self, range: TextRange, text: &str) -> Result<(), EditError> {
        let removed = self.apply(range, text)?;
        self.undo.stop();
        self.undo.record(TextChange {
            range: TextRange::with_len(range.start(), char_len(text)),
            text: removed,
        });
        self.undo.stop();
        self.emit(
            EditOrigin::External,
            vec![TextChange {
                range,
                text: text.to_owned(),
            }],
        );
        Ok(())
    }

    /// Change the text without reporting it, like a write the engine never
    /// hears about (another process rewriting the file underneath).
    pub fn edit_unobserved(&mut self, range: TextRange, text: &str) -> Result<(), EditError> {
        self.apply(range, text).map(drop)
    }

    /// Revert the most recent undo group. Returns `false` when there is none.
    pub fn undo(&mut self) -> bool {
        self.undo.stop();
        let Some(group) = self.undo.closed.pop() else {
            return false;
        };

        let mut reported = Vec::with_capacity(group.inverses.len());
        for inverse in group.inverses.into_iter().rev() {
            if let Err(err) = self.apply(inverse.range, &inverse.text) {
                tracing::warn!(uri = %self.uri, "Undo stopped early: {err}");
                break;
            }
            reported.push(inverse);
        }
        self.emit(EditOrigin::External, reported);
        true
    }

    fn apply(&mut self, range: TextRange, text: &str) -> Result<String, EditError> {
        let start = byte_index(&self.text, range.start()).ok_or(EditError::OutOfRange(range))?;
        let end = byte_index(&self.text, range.end()).ok_or(EditError::OutOfRange(range))?;
        let removed = self.text[start..end].to_owned();
        self.text.replace_range(start..end, text);
        self.version += 1;
        Ok(removed)
    }

    fn emit(&self, origin: EditOrigin, changes: Vec<TextChange>) {
        if changes.is_empty() {
            return;
        }
        // Nobody listening is fine; the CLI drops the receiver once it is done.
        let _ = self.changes.send(DocumentChange {
            uri: self.uri.clone(),
            origin,
            changes,
        });
    }
}

impl EditSurface for MemoryDocument {
    fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    fn text(&self) -> &str {
        &self.text
    }

    async fn replace(
        &mut self,
        range: TextRange,
        text: &str,
        options: EditOptions,
    ) -> Result<(), EditError> {
        if self.refuse_edits > 0 {
            self.refuse_edits -= 1;
            return Err(EditError::Rejected(format!(
                "document {} changed (version {})",
                self.uri, self.version
            )));
        }

        let removed = self.apply(range, text)?;
        if options.undo_stop_before {
            self.undo.stop();
        }
        self.undo.record(TextChange {
            range: TextRange::with_len(range.start(), char_len(text)),
            text: removed,
        });
        if options.undo_stop_after {
            self.undo.stop();
        }

        self.emit(
            options.origin,
            vec![TextChange {
                range,
                text: text.to_owned(),
            }],
        );
        Ok(())
    }

    async fn undo_stop(&mut self) {
        self.undo.stop();
    }
}

/// A set of open [`MemoryDocument`]s sharing one change channel.
#[derive(Debug)]
pub struct MemoryWorkspace {
    documents: HashMap<DocumentUri, MemoryDocument>,
    changes: mpsc::UnboundedSender<DocumentChange>,
}

impl MemoryWorkspace {
    /// The receiver yields every change made to any document in the workspace.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DocumentChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        (
            Self {
                documents: HashMap::new(),
                changes,
            },
            rx,
        )
    }

    /// Open (or reopen, discarding history) a document.
    pub fn open(&mut self, uri: DocumentUri, text: impl Into<String>) -> &mut MemoryDocument {
        let document = MemoryDocument {
            uri: uri.clone(),
            text: text.into(),
            version: 0,
            undo: UndoHistory::default(),
            changes: self.changes.clone(),
            refuse_edits: 0,
        };
        self.documents
            .entry(uri)
            .insert_entry(document)
            .into_mut()
    }

    pub fn close(&mut self, uri: &DocumentUri) -> Option<MemoryDocument> {
        self.documents.remove(uri)
    }
}

impl Workspace for MemoryWorkspace {
    type Document = MemoryDocument;

    fn document(&self, uri: &DocumentUri) -> Option<&MemoryDocument> {
        self.documents.get(uri)
    }

    fn document_mut(&mut self, uri: &DocumentUri) -> Option<&mut MemoryDocument> {
        self.documents.get_mut(uri)
    }
}
