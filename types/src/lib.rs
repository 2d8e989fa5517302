//! Core domain types for the ECA rewrite engine.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! identifiers, char-offset ranges and positions, edit provenance, and the
//! vocabulary of events the backend streams for a rewrite.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod content;
mod edit;
mod ids;
pub mod text;

pub use content::{RewriteContent, RewriteEvent};
pub use edit::{DocumentChange, EditOptions, EditOrigin, TextChange};
pub use ids::{DocumentUri, RewriteId, RewriteIdParseError};
pub use text::{Position, TextRange};
