//! Streaming rewrite engine.
//!
//! A user selects text and asks for a rewrite. The backend streams the
//! replacement back in small chunks, and the engine:
//!
//! - tracks every live rewrite in a registry ([`RewriteManager`]),
//! - swaps the selection for generated text as it arrives, batching chunks
//!   into debounced edits (`applier`),
//! - shows a header, highlight, and Accept/Reject actions for each rewrite
//!   ([`Affordances`]),
//! - ends a rewrite silently when someone else edits the text it owns.
//!
//! The engine is single-threaded: [`RewriteDriver`] owns the manager and
//! feeds it one input at a time. Editors plug in through [`Workspace`] and
//! [`EditSurface`]; backends through [`RewriteBackend`].

mod affordance;
mod applier;
mod backend;
mod driver;
mod error;
mod manager;
mod memory;
mod notice;
mod session;
mod surface;

pub use affordance::{Affordances, HeaderLabel, Lens, LensCommand, LineSpan};
pub use backend::{RecordingBackend, RewriteBackend};
pub use driver::{HostEvent, RewriteDriver, RewriteInput, TriggerReply};
pub use error::{BackendError, CommandError, EditError, TriggerError};
pub use manager::{RewriteManager, RewriteSettings, RewriteTrigger, SessionUpdate};
pub use memory::{MemoryDocument, MemoryWorkspace};
pub use notice::{Notice, NoticeLevel, NoticeQueue};
pub use session::{Lifecycle, RewriteSession};
pub use surface::{EditSurface, Workspace};
