//! Streaming Applier: turns generated text into document edits.
//!
//! Text arrives in many small chunks. It is buffered on the session and
//! written in batches: the first chunk after a flush arms a short timer, and
//! everything that arrives before it fires goes into a single insert at the
//! end of the applied region. Only one flush runs at a time because the
//! caller holds the session mutably for its whole duration.

use std::mem;
use std::time::{Duration, Instant};

use eca_types::EditOptions;
use eca_types::text::{self, TextRange, char_len};

use crate::error::{ApplyError, EditError};
use crate::session::{FlushState, Lifecycle, RewriteSession};
use crate::surface::EditSurface;

/// Swap the original text for an empty region and switch to streaming.
///
/// Returns `true` if the original was found somewhere other than its recorded
/// anchor. Calling this on a session that already started is a no-op.
pub(crate) async fn begin_streaming<D: EditSurface>(
    session: &mut RewriteSession,
    doc: &mut D,
) -> Result<bool, ApplyError> {
    if session.state != Lifecycle::Requesting {
        return Ok(false);
    }

    let expected = session.original_range();
    let range = if doc.text_in(expected) == Some(session.original_text()) {
        expected
    } else {
        let found = locate_original(doc.text(), session.original_text(), expected.start())
            .ok_or(ApplyError::AnchorLost)?;
        tracing::info!(
            rewrite_id = %session.id(),
            expected = expected.start(),
            found,
            "Original text moved; re-anchoring"
        );
        TextRange::with_len(found, expected.len())
    };

    doc.replace(range, "", EditOptions::opening(session.id()))
        .await?;

    let relocated = range.start() != session.anchor;
    session.anchor = range.start();
    session.applied = 0;
    session.state = Lifecycle::Streaming;
    Ok(relocated)
}

/// The occurrence of `original` closest to where it was expected.
fn locate_original(text: &str, original: &str, expected: usize) -> Option<usize> {
    text::find_all(text, original)
        .into_iter()
        .min_by_key(|offset| offset.abs_diff(expected))
}

pub(crate) fn enqueue_text(session: &mut RewriteSession, chunk: &str) {
    session.pending.push_str(chunk);
}

/// Arm the flush timer unless one is already armed. Text that arrives before
/// streaming starts stays buffered until then.
///
/// Returns whether a new timer was armed.
pub(crate) fn schedule_flush(session: &mut RewriteSession, now: Instant, delay: Duration) -> bool {
    if !session.state.has_started()
        || session.pending.is_empty()
        || session.flush != FlushState::Idle
    {
        return false;
    }
    session.flush = FlushState::Scheduled { due: now + delay };
    true
}

/// Write all pending text at the end of the applied region.
///
/// If the surface refuses the targeted insert, retries once by replacing the
/// whole applied region with its current text plus the new chunk. Returns the
/// number of chars added.
pub(crate) async fn flush<D: EditSurface>(
    session: &mut RewriteSession,
    doc: &mut D,
) -> Result<usize, ApplyError> {
    session.flush = FlushState::Idle;
    if !session.state.has_started() || session.pending.is_empty() {
        return Ok(0);
    }

    let chunk = mem::take(&mut session.pending);
    let added = char_len(&chunk);
    let at = session.anchor + session.applied;

    match doc
        .insert(at, &chunk, EditOptions::streaming(session.id()))
        .await
    {
        Ok(()) => session.applied += added,
        Err(err) => {
            tracing::warn!(
                rewrite_id = %session.id(),
                "Insert at {at} refused ({err}); rewriting whole region"
            );
            let region = session.applied_range();
            let mut full = doc
                .text_in(region)
                .ok_or(EditError::OutOfRange(region))?
                .to_owned();
            full.push_str(&chunk);
            doc.replace(region, &full, EditOptions::streaming(session.id()))
                .await?;
            session.applied = char_len(&full);
        }
    }

    tracing::debug!(
        rewrite_id = %session.id(),
        added,
        applied = session.applied,
        "Flushed"
    );
    Ok(added)
}
