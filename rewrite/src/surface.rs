//! Capabilities the engine needs from an editor.
//!
//! A session never holds a document. It holds the document's URI and resolves
//! it through [`Workspace`] for every read or write, so a closed document shows
//! up as `None` at the moment it matters.

use std::future::Future;

use eca_types::text::{self, Position, TextRange};
use eca_types::{DocumentUri, EditOptions};

use crate::error::EditError;

/// One editable document.
///
/// Offsets are char offsets into [`EditSurface::text`]. Edits are applied in
/// order; a write that resolves `Ok` is visible to the next read.
pub trait EditSurface {
    fn uri(&self) -> &DocumentUri;

    fn text(&self) -> &str;

    /// `None` when `range` runs past the end of the document.
    fn text_in(&self, range: TextRange) -> Option<&str> {
        text::slice(self.text(), range)
    }

    fn position_at(&self, offset: usize) -> Position {
        text::position_at(self.text(), offset)
    }

    fn offset_at(&self, position: Position) -> usize {
        text::offset_at(self.text(), position)
    }

    /// Replace `range` with `text`.
    fn replace(
        &mut self,
        range: TextRange,
        text: &str,
        options: EditOptions,
    ) -> impl Future<Output = Result<(), EditError>>;

    fn insert(
        &mut self,
        offset: usize,
        text: &str,
        options: EditOptions,
    ) -> impl Future<Output = Result<(), EditError>> {
        self.replace(TextRange::at(offset), text, options)
    }

    /// Close the current undo group.
    fn undo_stop(&mut self) -> impl Future<Output = ()>;
}

/// Resolves documents by URI.
pub trait Workspace {
    type Document: EditSurface;

    fn document(&self, uri: &DocumentUri) -> Option<&Self::Document>;

    fn document_mut(&mut self, uri: &DocumentUri) -> Option<&mut Self::Document>;
}
