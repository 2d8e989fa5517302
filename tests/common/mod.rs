//! Shared test utilities and fixtures
//!
//! A [`Harness`] wires a [`RewriteManager`] to an in-memory workspace and a
//! recording backend, and plays backend events and user edits into it.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use eca_rewrite::{
    EditSurface, Lifecycle, MemoryDocument, MemoryWorkspace, RecordingBackend, RewriteManager,
    RewriteSettings, RewriteTrigger, Workspace,
};
use eca_types::text::TextRange;
use eca_types::{DocumentChange, DocumentUri, RewriteEvent, RewriteId};
use tokio::sync::mpsc;

pub const URI: &str = "file:///work/src/lib.rs";

pub fn uri() -> DocumentUri {
    DocumentUri::from(URI)
}

/// 99 filler chars and a newline, so the next char sits at offset 100 on line 1.
pub fn hundred_char_prefix() -> String {
    let mut prefix = "/".repeat(99);
    prefix.push('\n');
    prefix
}

pub struct Harness {
    pub manager: RewriteManager<MemoryWorkspace, RecordingBackend>,
    changes: mpsc::UnboundedReceiver<DocumentChange>,
}

impl Harness {
    pub fn new(text: &str) -> Self {
        Self::with_settings(text, RewriteSettings::default())
    }

    pub fn with_settings(text: &str, settings: RewriteSettings) -> Self {
        let (mut workspace, changes) = MemoryWorkspace::new();
        workspace.open(uri(), text);
        Self {
            manager: RewriteManager::new(workspace, RecordingBackend::default(), settings),
            changes,
        }
    }

    pub async fn trigger(&mut self, start: usize, end: usize) -> RewriteId {
        self.manager
            .create(RewriteTrigger {
                uri: uri(),
                path: "/work/src/lib.rs".to_string(),
                selection: TextRange::new(start, end),
                prompt: "add a comment".to_string(),
            })
            .await
            .expect("trigger should start a session")
    }

    pub async fn send(&mut self, id: RewriteId, event: RewriteEvent) {
        self.manager.dispatch_event(id, event).await;
        self.deliver_changes();
    }

    pub async fn chunk(&mut self, id: RewriteId, text: &str) {
        self.send(
            id,
            RewriteEvent::Text {
                text: text.to_string(),
            },
        )
        .await;
    }

    /// `started`, every chunk, `finished`.
    pub async fn stream(&mut self, id: RewriteId, chunks: &[&str]) {
        self.send(id, RewriteEvent::Started).await;
        for chunk in chunks {
            self.chunk(id, chunk).await;
        }
        self.send(id, RewriteEvent::Finished).await;
    }

    /// Run every armed flush as if its timer fired.
    pub async fn fire_timers(&mut self) -> usize {
        let ran = self
            .manager
            .flush_due(Instant::now() + Duration::from_secs(60))
            .await;
        self.deliver_changes();
        ran
    }

    /// Hand every reported document change to the manager, as the editor's
    /// change event would.
    pub fn deliver_changes(&mut self) {
        while let Ok(change) = self.changes.try_recv() {
            self.manager.on_document_changed(&change);
        }
    }

    pub fn doc(&self) -> &MemoryDocument {
        self.manager
            .workspace()
            .document(&uri())
            .expect("document is open")
    }

    pub fn doc_mut(&mut self) -> &mut MemoryDocument {
        self.manager
            .workspace_mut()
            .document_mut(&uri())
            .expect("document is open")
    }

    pub fn text(&self) -> String {
        self.doc().text().to_string()
    }

    /// A user edit, reported to the manager.
    pub fn user_edit(&mut self, range: TextRange, text: &str) {
        self.doc_mut().edit(range, text).expect("edit in range");
        self.deliver_changes();
    }

    pub fn lifecycle(&self, id: RewriteId) -> Lifecycle {
        self.manager.lifecycle(id)
    }
}
