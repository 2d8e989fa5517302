//! Session Registry: owns every live rewrite and routes events to it.
//!
//! Sessions live in a map keyed by id. Removing a session from the map is
//! its termination; every path that removes one also clears its affordances,
//! so nothing visual outlives the session. Events for ids that are no longer
//! registered are dropped.

use std::collections::HashMap;
use std::mem;
use std::time::{Duration, Instant};

use eca_rpc::{RewritePromptParams, ServerStopReason, WireRange};
use eca_types::text::{TextRange, char_len};
use eca_types::{DocumentChange, DocumentUri, EditOptions, RewriteEvent, RewriteId};

use crate::affordance::{self, Affordances, HeaderLabel, Impact, Lens, LineSpan};
use crate::applier;
use crate::backend::RewriteBackend;
use crate::error::{ApplyError, CommandError, TriggerError};
use crate::notice::{Notice, NoticeQueue};
use crate::session::{Lifecycle, RewriteSession};
use crate::surface::{EditSurface, Workspace};

const ANCHOR_LOST_MESSAGE: &str =
    "ECA: could not start streaming rewrite (document was modified).";

const RESTORE_FAILED_MESSAGE: &str =
    "ECA: could not restore the original text; use undo to revert the rewrite.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSettings {
    /// Prepended to every prompt.
    pub prompt_prefix: String,
    pub flush_delay: Duration,
    /// Refuse triggers whose selection overlaps a live session.
    pub reject_overlapping: bool,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            prompt_prefix: String::new(),
            flush_delay: Duration::from_millis(10),
            reject_overlapping: true,
        }
    }
}

/// Everything needed to start a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteTrigger {
    pub uri: DocumentUri,
    /// Filesystem path sent to the backend for context.
    pub path: String,
    pub selection: TextRange,
    pub prompt: String,
}

/// A session changed lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUpdate {
    pub id: RewriteId,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Accepted,
    Rejected,
    Interference,
    RequestFailed,
    BackendStopped,
    SurfaceGone,
    AnchorLost,
    EditFailed,
}

pub struct RewriteManager<W, B> {
    workspace: W,
    backend: B,
    settings: RewriteSettings,
    sessions: HashMap<RewriteId, RewriteSession>,
    affordances: Affordances,
    notices: NoticeQueue,
    updates: Vec<SessionUpdate>,
}

impl<W: Workspace, B: RewriteBackend> RewriteManager<W, B> {
    pub fn new(workspace: W, backend: B, settings: RewriteSettings) -> Self {
        Self {
            workspace,
            backend,
            settings,
            sessions: HashMap::new(),
            affordances: Affordances::default(),
            notices: NoticeQueue::default(),
            updates: Vec::new(),
        }
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut W {
        &mut self.workspace
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &RewriteSettings {
        &self.settings
    }

    pub fn into_parts(self) -> (W, B) {
        (self.workspace, self.backend)
    }

    // ========================================================================
    // Trigger
    // ========================================================================

    /// Start a rewrite of `trigger.selection`.
    ///
    /// Returns as soon as the prompt is on its way; the session is then in
    /// `Requesting`. On failure no session exists and a notice explains why.
    pub async fn create(&mut self, trigger: RewriteTrigger) -> Result<RewriteId, TriggerError> {
        let result = self.start_session(trigger).await;
        if let Err(err) = &result {
            match err {
                TriggerError::Disconnected | TriggerError::Backend(_) => {
                    self.notices.error(err.to_string());
                }
                _ => self.notices.warning(err.to_string()),
            }
        }
        result
    }

    async fn start_session(&mut self, trigger: RewriteTrigger) -> Result<RewriteId, TriggerError> {
        let RewriteTrigger {
            uri,
            path,
            selection,
            prompt,
        } = trigger;

        let doc = self
            .workspace
            .document(&uri)
            .ok_or(TriggerError::NoDocument)?;
        if !self.backend.is_connected() {
            return Err(TriggerError::Disconnected);
        }
        if selection.is_empty() {
            return Err(TriggerError::EmptySelection);
        }
        let original = doc
            .text_in(selection)
            .ok_or(TriggerError::OutOfRange)?
            .to_owned();
        if self.settings.reject_overlapping
            && let Some(other) = self.overlapping(&uri, selection)
        {
            return Err(TriggerError::Overlapping(other));
        }
        let range = WireRange::new(
            doc.position_at(selection.start()),
            doc.position_at(selection.end()),
        );

        let id = RewriteId::new();
        self.sessions.insert(
            id,
            RewriteSession::new(id, uri.clone(), selection.start(), original.clone()),
        );
        self.affordances.show(id, uri.clone(), selection.start());
        self.updates.push(SessionUpdate {
            id,
            lifecycle: Lifecycle::Requesting,
        });

        let params = RewritePromptParams {
            id,
            text: original,
            prompt: format!("{}{prompt}", self.settings.prompt_prefix),
            path,
            range,
        };
        if let Err(err) = self.backend.send_prompt(params).await {
            self.terminate(id, Termination::RequestFailed);
            return Err(TriggerError::Backend(err.to_string()));
        }

        tracing::info!(
            rewrite_id = %id,
            uri = %uri,
            start = selection.start(),
            end = selection.end(),
            "Rewrite requested"
        );
        Ok(id)
    }

    fn overlapping(&self, uri: &DocumentUri, selection: TextRange) -> Option<RewriteId> {
        self.sessions
            .values()
            .filter(|session| session.uri() == uri)
            .find(|session| {
                let region = session.region();
                region.intersects(selection) || selection.intersects(region)
            })
            .map(RewriteSession::id)
    }

    // ========================================================================
    // Backend events
    // ========================================================================

    /// Route one backend event to its session.
    pub async fn dispatch_event(&mut self, id: RewriteId, event: RewriteEvent) {
        let Some(session) = self.sessions.get_mut(&id) else {
            tracing::debug!(
                rewrite_id = %id,
                kind = event.kind(),
                "Dropping event for inactive rewrite"
            );
            return;
        };
        tracing::debug!(
            rewrite_id = %id,
            kind = event.kind(),
            state = %session.lifecycle(),
            "Rewrite event"
        );

        match event {
            RewriteEvent::Reasoning { .. } => {
                if session.lifecycle() != Lifecycle::Finished {
                    self.affordances.set_label(id, HeaderLabel::Reasoning);
                }
            }
            RewriteEvent::Started => {
                self.start_streaming(id).await;
            }
            RewriteEvent::Text { text } => {
                applier::enqueue_text(session, &text);
                applier::schedule_flush(session, Instant::now(), self.settings.flush_delay);
            }
            RewriteEvent::Finished => self.finish(id).await,
            RewriteEvent::Failed { message } => self.request_failed(id, &message),
        }
    }

    /// Swap the original text out. Returns whether the session is streaming
    /// (or past it) afterwards.
    async fn start_streaming(&mut self, id: RewriteId) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if session.lifecycle().has_started() {
            return true;
        }
        let Some(doc) = self.workspace.document_mut(session.uri()) else {
            self.terminate(id, Termination::SurfaceGone);
            return false;
        };

        match applier::begin_streaming(session, doc).await {
            Ok(relocated) => {
                let anchor = session.anchor();
                let emptied = session.original_range();
                let uri = session.uri().clone();
                // Text that arrived before `started` is waiting in the buffer.
                applier::schedule_flush(session, Instant::now(), self.settings.flush_delay);
                if relocated {
                    self.affordances.move_anchor(id, anchor);
                }
                self.shift_neighbours(id, &uri, emptied, 0);
                self.affordances.set_label(id, HeaderLabel::Rewriting);
                self.updates.push(SessionUpdate {
                    id,
                    lifecycle: Lifecycle::Streaming,
                });
                tracing::info!(rewrite_id = %id, anchor, "Rewrite streaming");
                true
            }
            Err(err) => {
                tracing::warn!(rewrite_id = %id, "Could not start streaming: {err}");
                let reason = match err {
                    ApplyError::AnchorLost => Termination::AnchorLost,
                    ApplyError::Edit(_) => Termination::EditFailed,
                };
                self.notices.warning(ANCHOR_LOST_MESSAGE);
                self.terminate(id, reason);
                false
            }
        }
    }

    async fn finish(&mut self, id: RewriteId) {
        if !self.start_streaming(id).await || !self.flush_session(id).await {
            return;
        }
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.lifecycle() == Lifecycle::Finished {
            return;
        }
        session.state = Lifecycle::Finished;
        let applied = session.applied_len();
        self.affordances.show_actions(id);
        self.updates.push(SessionUpdate {
            id,
            lifecycle: Lifecycle::Finished,
        });
        tracing::info!(rewrite_id = %id, applied, "Rewrite finished");
    }

    fn request_failed(&mut self, id: RewriteId, message: &str) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        if session.lifecycle().has_started() {
            // Generated text is already in the document; leave it to accept/reject.
            self.notices
                .warning(format!("ECA: rewrite request reported an error: {message}"));
            return;
        }
        self.notices.error(format!("Rewrite failed to start: {message}"));
        self.terminate(id, Termination::RequestFailed);
    }

    /// The backend connection ended. Sessions still waiting for their first
    /// content will never get it; started ones stay for accept/reject.
    pub fn on_backend_stopped(&mut self, reason: &ServerStopReason) {
        let waiting: Vec<RewriteId> = self
            .sessions
            .values()
            .filter(|session| session.lifecycle() == Lifecycle::Requesting)
            .map(RewriteSession::id)
            .collect();

        let detail = match reason {
            ServerStopReason::Exited => String::from("ECA server stopped."),
            ServerStopReason::Failed(err) => format!("ECA server stopped: {err}"),
        };
        self.notices.error(detail);

        for id in waiting {
            self.terminate(id, Termination::BackendStopped);
        }
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    /// Earliest pending flush deadline across all sessions.
    #[must_use]
    pub fn next_flush_due(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(RewriteSession::flush_due)
            .min()
    }

    /// Run every flush whose deadline is at or before `now`. Returns how many ran.
    pub async fn flush_due(&mut self, now: Instant) -> usize {
        let due: Vec<RewriteId> = self
            .sessions
            .values()
            .filter(|session| session.flush_due().is_some_and(|due| due <= now))
            .map(RewriteSession::id)
            .collect();

        let mut ran = 0;
        for id in due {
            if self.flush_session(id).await {
                ran += 1;
            }
        }
        ran
    }

    /// Flush one session and refresh its highlight. A failed flush ends the
    /// session the same way interference does.
    async fn flush_session(&mut self, id: RewriteId) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        let Some(doc) = self.workspace.document_mut(session.uri()) else {
            self.terminate(id, Termination::SurfaceGone);
            return false;
        };

        let before = session.applied_range();
        match applier::flush(session, doc).await {
            Ok(_) => {
                let span = affordance::covered_lines(doc, session.applied_range());
                self.affordances.highlight(id, session.uri(), span);
                let (uri, applied) = (session.uri().clone(), session.applied_len());
                self.shift_neighbours(id, &uri, before, applied);
                true
            }
            Err(err) => {
                tracing::warn!(rewrite_id = %id, "Flush failed: {err}");
                self.terminate(id, Termination::EditFailed);
                false
            }
        }
    }

    // ========================================================================
    // User commands
    // ========================================================================

    /// Keep the generated text. Only a finished session can be accepted.
    pub async fn accept(&mut self, id: RewriteId) -> Result<(), CommandError> {
        let session = self
            .sessions
            .get(&id)
            .ok_or(CommandError::UnknownSession(id))?;
        if session.lifecycle() != Lifecycle::Finished {
            return Err(CommandError::NotFinished(id));
        }

        self.affordances.clear(id);
        if let Some(doc) = self.workspace.document_mut(session.uri()) {
            doc.undo_stop().await;
        }
        self.terminate(id, Termination::Accepted);
        Ok(())
    }

    /// Put the original text back, in any state.
    pub async fn reject(&mut self, id: RewriteId) -> Result<(), CommandError> {
        let Some(session) = self.sessions.get_mut(&id) else {
            return Err(CommandError::UnknownSession(id));
        };
        self.affordances.clear(id);

        if session.lifecycle().has_started()
            && let Some(doc) = self.workspace.document_mut(session.uri())
        {
            let before = session.applied_range();
            if let Err(err) = applier::flush(session, doc).await {
                tracing::debug!(rewrite_id = %id, "Final flush before reject failed: {err}");
            }
            let region = session.applied_range();
            let restore = doc
                .replace(region, session.original_text(), EditOptions::closing(id))
                .await;
            let uri = session.uri().clone();
            let restored = match restore {
                Ok(()) => char_len(session.original_text()),
                Err(err) => {
                    tracing::warn!(rewrite_id = %id, "Restoring original text failed: {err}");
                    self.notices.warning(RESTORE_FAILED_MESSAGE);
                    region.len()
                }
            };
            self.shift_neighbours(id, &uri, before, restored);
        }

        self.terminate(id, Termination::Rejected);
        Ok(())
    }

    // ========================================================================
    // Document changes
    // ========================================================================

    /// React to a change reported by a document.
    ///
    /// Changes made by any session are ignored; the manager already moved
    /// the other sessions when it made them. Any other change that touches
    /// a session's region ends the session silently,
    /// leaving the document as it is; a change entirely before the region
    /// moves the region with the text. The edits of one change are taken in
    /// order, each against the regions left by the ones before it.
    pub fn on_document_changed(&mut self, change: &DocumentChange) {
        if let Some(id) = change.origin.session() {
            tracing::trace!(rewrite_id = %id, uri = %change.uri, "Skipping engine edit");
            return;
        }
        for edit in &change.changes {
            let mut hit = Vec::new();
            let mut moved = Vec::new();

            for session in self
                .sessions
                .values_mut()
                .filter(|session| session.uri() == &change.uri)
            {
                match affordance::impact_of(session.region(), edit.range, edit.len_delta()) {
                    Impact::Interferes => hit.push(session.id()),
                    Impact::Shifts(delta) => {
                        session.shift_anchor(delta);
                        moved.push(session.id());
                    }
                    Impact::Unaffected => {}
                }
            }

            for id in moved {
                self.refresh_position(id);
            }
            for id in hit {
                tracing::info!(
                    rewrite_id = %id,
                    uri = %change.uri,
                    "External edit overlapped the rewrite region"
                );
                self.terminate(id, Termination::Interference);
            }
        }
    }

    /// Move the other sessions on `uri` past an edit session `id` just made,
    /// which replaced `edited` with `inserted` chars.
    ///
    /// Engine edits are never interference, so their change notifications are
    /// skipped in [`Self::on_document_changed`]; neighbours are moved here,
    /// before any later edit can make the notification stale.
    fn shift_neighbours(
        &mut self,
        id: RewriteId,
        uri: &DocumentUri,
        edited: TextRange,
        inserted: usize,
    ) {
        let delta = inserted as isize - edited.len() as isize;
        if delta == 0 {
            return;
        }
        let mut moved = Vec::new();
        for session in self
            .sessions
            .values_mut()
            .filter(|session| session.id() != id && session.uri() == uri)
        {
            if let Impact::Shifts(delta) = affordance::impact_of(session.region(), edited, delta) {
                session.shift_anchor(delta);
                moved.push(session.id());
            }
        }
        for other in moved {
            self.refresh_position(other);
        }
    }

    fn refresh_position(&mut self, id: RewriteId) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        self.affordances.move_anchor(id, session.anchor());
        if let Some(doc) = self.workspace.document(session.uri()) {
            let span = affordance::covered_lines(doc, session.applied_range());
            self.affordances.highlight(id, session.uri(), span);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lifecycle of `id`; ids that are not registered report `Terminated`.
    #[must_use]
    pub fn lifecycle(&self, id: RewriteId) -> Lifecycle {
        self.sessions
            .get(&id)
            .map_or(Lifecycle::Terminated, RewriteSession::lifecycle)
    }

    #[must_use]
    pub fn session(&self, id: RewriteId) -> Option<&RewriteSession> {
        self.sessions.get(&id)
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn affordances(&self) -> &Affordances {
        &self.affordances
    }

    pub fn lenses_for(&self, uri: &DocumentUri) -> Vec<Lens> {
        self.workspace
            .document(uri)
            .map(|doc| self.affordances.lenses_for(doc))
            .unwrap_or_default()
    }

    pub fn highlights_for(&self, uri: &DocumentUri) -> Vec<LineSpan> {
        self.affordances.highlights_for(uri)
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        mem::take(&mut self.updates)
    }

    fn terminate(&mut self, id: RewriteId, reason: Termination) {
        self.affordances.clear(id);
        if self.sessions.remove(&id).is_some() {
            self.updates.push(SessionUpdate {
                id,
                lifecycle: Lifecycle::Terminated,
            });
            tracing::info!(rewrite_id = %id, ?reason, "Rewrite ended");
        }
    }
}
