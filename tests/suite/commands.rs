//! Accept and reject.

use eca_rewrite::{CommandError, Lifecycle};
use eca_types::RewriteEvent;

use crate::common::{Harness, uri};

#[tokio::test]
async fn accept_keeps_text_and_removes_affordances() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.stream(id, &["ne", "w"]).await;

    h.manager.accept(id).await.unwrap();

    assert_eq!(h.text(), "x = new;\n");
    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert!(h.manager.lenses_for(&uri()).is_empty());
    assert!(h.manager.highlights_for(&uri()).is_empty());

    // A second accept is a no-op.
    assert_eq!(
        h.manager.accept(id).await,
        Err(CommandError::UnknownSession(id))
    );
    assert_eq!(h.text(), "x = new;\n");
}

#[tokio::test]
async fn accepted_rewrite_undoes_in_one_step() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.send(id, RewriteEvent::Started).await;
    for chunk in ["n", "e", "w"] {
        h.chunk(id, chunk).await;
        h.fire_timers().await;
    }
    h.send(id, RewriteEvent::Finished).await;
    h.manager.accept(id).await.unwrap();

    assert_eq!(h.doc().undo_depth(), 1);
    assert!(h.doc_mut().undo());
    assert_eq!(h.text(), "x = old;\n");
}

#[tokio::test]
async fn accept_before_finished_is_refused() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "ne").await;

    assert_eq!(h.manager.accept(id).await, Err(CommandError::NotFinished(id)));
    assert_eq!(h.lifecycle(id), Lifecycle::Streaming);
}

#[tokio::test]
async fn reject_mid_stream_restores_original() {
    let mut h = Harness::new("fn f() { old() }\n");
    let id = h.trigger(9, 14).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "new_a").await;
    h.fire_timers().await;
    // Still buffered when the user rejects.
    h.chunk(id, "(1)").await;

    h.manager.reject(id).await.unwrap();
    h.deliver_changes();

    assert_eq!(h.text(), "fn f() { old() }\n");
    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert!(h.manager.lenses_for(&uri()).is_empty());

    // Whatever the backend still sends is dropped.
    h.chunk(id, "late").await;
    h.send(id, RewriteEvent::Finished).await;
    assert_eq!(h.text(), "fn f() { old() }\n");
}

#[tokio::test]
async fn reject_after_finished_restores_original() {
    let mut h = Harness::new("a\nb\nc\n");
    let id = h.trigger(2, 4).await;
    h.stream(id, &["B1\n", "B2\n"]).await;
    assert_eq!(h.text(), "a\nB1\nB2\nc\n");

    h.manager.reject(id).await.unwrap();

    assert_eq!(h.text(), "a\nb\nc\n");
    assert!(h.manager.highlights_for(&uri()).is_empty());
}

#[tokio::test]
async fn reject_before_started_leaves_document_alone() {
    let mut h = Harness::new("keep(me);\n");
    let id = h.trigger(0, 9).await;
    let version = h.doc().version();

    h.manager.reject(id).await.unwrap();
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "changed").await;
    h.fire_timers().await;

    assert_eq!(h.text(), "keep(me);\n");
    assert_eq!(h.doc().version(), version);
    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
}

#[tokio::test]
async fn second_reject_changes_nothing() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.stream(id, &["new"]).await;

    h.manager.reject(id).await.unwrap();
    let version = h.doc().version();

    assert_eq!(
        h.manager.reject(id).await,
        Err(CommandError::UnknownSession(id))
    );
    assert_eq!(h.doc().version(), version);
    assert_eq!(h.text(), "x = old;\n");
}

#[tokio::test]
async fn failed_restore_warns_and_still_ends_session() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.stream(id, &["new"]).await;
    h.doc_mut().refuse_next_edits(1);

    h.manager.reject(id).await.unwrap();

    assert_eq!(h.text(), "x = new;\n");
    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.manager.drain_notices().len(), 1);
}
