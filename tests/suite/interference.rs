//! Edits the engine did not make.

use eca_rewrite::Lifecycle;
use eca_types::RewriteEvent;
use eca_types::text::TextRange;

use crate::common::{Harness, uri};

#[tokio::test]
async fn typing_inside_streamed_text_ends_session_silently() {
    let mut h = Harness::new("let v = old;\n");
    let id = h.trigger(8, 11).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "new_value").await;
    h.fire_timers().await;

    h.user_edit(TextRange::new(11, 11), "X");

    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.text(), "let v = newX_value;\n");
    assert!(h.manager.lenses_for(&uri()).is_empty());
    assert!(h.manager.highlights_for(&uri()).is_empty());
    assert!(h.manager.drain_notices().is_empty());

    h.chunk(id, "_more").await;
    h.send(id, RewriteEvent::Finished).await;
    assert_eq!(h.text(), "let v = newX_value;\n");
}

#[tokio::test]
async fn editing_a_finished_rewrite_ends_session_and_keeps_the_edit() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.stream(id, &["n", "ew"]).await;
    assert_eq!(h.lifecycle(id), Lifecycle::Finished);
    assert!(h.manager.affordances().has_actions(id));

    h.user_edit(TextRange::new(5, 6), "Z");

    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.text(), "x = nZw;\n");
    assert!(!h.manager.affordances().has_actions(id));
    assert_eq!(h.manager.affordances().highlight_of(id), None);
    assert!(h.manager.lenses_for(&uri()).is_empty());
    assert!(h.manager.highlights_for(&uri()).is_empty());
    assert!(h.manager.drain_notices().is_empty());
}

#[tokio::test]
async fn editing_the_selection_before_start_ends_session() {
    let mut h = Harness::new("let v = old;\n");
    let id = h.trigger(8, 11).await;

    h.user_edit(TextRange::new(9, 10), "L");
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "new").await;
    h.fire_timers().await;

    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.text(), "let v = oLd;\n");
}

#[tokio::test]
async fn edits_above_move_the_region() {
    let mut h = Harness::new("fn a() {}\nfn b() { old }\n");
    let id = h.trigger(19, 22).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "ne").await;
    h.fire_timers().await;

    h.user_edit(TextRange::at(0), "// docs\n");
    assert_eq!(h.lifecycle(id), Lifecycle::Streaming);
    assert_eq!(h.manager.session(id).unwrap().anchor(), 27);
    assert_eq!(h.manager.lenses_for(&uri())[0].line, 2);

    h.chunk(id, "w").await;
    h.send(id, RewriteEvent::Finished).await;

    assert_eq!(h.text(), "// docs\nfn a() {}\nfn b() { new }\n");
    h.manager.accept(id).await.unwrap();
}

#[tokio::test]
async fn deleting_above_moves_the_region_back() {
    let mut h = Harness::new("// docs\nfn b() { old }\n");
    let id = h.trigger(17, 20).await;
    h.user_edit(TextRange::new(0, 8), "");

    assert_eq!(h.manager.session(id).unwrap().anchor(), 9);
    h.stream(id, &["new"]).await;
    assert_eq!(h.text(), "fn b() { new }\n");
}

#[tokio::test]
async fn edits_after_the_region_are_ignored() {
    let mut h = Harness::new("x = old;\ny = 1;\n");
    let id = h.trigger(4, 7).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "new").await;
    h.fire_timers().await;

    h.user_edit(TextRange::new(13, 14), "2");
    // Right at the end of the applied text.
    h.user_edit(TextRange::at(7), ";");

    assert_eq!(h.lifecycle(id), Lifecycle::Streaming);
    assert_eq!(h.manager.session(id).unwrap().anchor(), 4);
    h.send(id, RewriteEvent::Finished).await;
    assert_eq!(h.text(), "x = new;;\ny = 2;\n");
}

#[tokio::test]
async fn concurrent_sessions_do_not_disturb_each_other() {
    let mut h = Harness::new("first();\nsecond();\n");
    let top = h.trigger(0, 8).await;
    let bottom = h.trigger(9, 18).await;

    h.send(bottom, RewriteEvent::Started).await;
    h.send(top, RewriteEvent::Started).await;
    assert_eq!(h.manager.session(bottom).unwrap().anchor(), 1);

    h.chunk(bottom, "two();").await;
    h.chunk(top, "one_and_a_half();").await;
    h.fire_timers().await;
    h.send(top, RewriteEvent::Finished).await;
    h.send(bottom, RewriteEvent::Finished).await;

    assert_eq!(h.text(), "one_and_a_half();\ntwo();\n");
    assert_eq!(h.lifecycle(top), Lifecycle::Finished);
    assert_eq!(h.lifecycle(bottom), Lifecycle::Finished);
    assert_eq!(h.manager.session(bottom).unwrap().anchor(), 18);

    h.manager.reject(top).await.unwrap();
    h.deliver_changes();
    assert_eq!(h.text(), "first();\ntwo();\n");
    assert_eq!(h.manager.session(bottom).unwrap().anchor(), 9);
    assert_eq!(h.manager.lenses_for(&uri())[0].line, 1);
}

#[tokio::test]
async fn closing_the_document_mid_stream_ends_session() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "new").await;

    h.manager.workspace_mut().close(&uri());
    h.fire_timers().await;

    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.manager.active_sessions(), 0);
}

#[tokio::test]
async fn surface_refusing_both_writes_ends_session() {
    let mut h = Harness::new("x = old;\n");
    let id = h.trigger(4, 7).await;
    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "new").await;

    h.doc_mut().refuse_next_edits(2);
    h.fire_timers().await;

    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.text(), "x = ;\n");
    assert!(h.manager.highlights_for(&uri()).is_empty());
}
