//! Streaming generated text into the document.

use eca_rewrite::{HeaderLabel, LensCommand, Lifecycle, LineSpan, NoticeLevel};
use eca_types::RewriteEvent;
use eca_types::text::TextRange;

use crate::common::{Harness, hundred_char_prefix, uri};

#[tokio::test]
async fn selection_is_replaced_by_streamed_text() {
    let prefix = hundred_char_prefix();
    let mut h = Harness::new(&format!("{prefix}foo(bar)\nrest();\n"));

    let id = h.trigger(100, 108).await;
    assert_eq!(h.lifecycle(id), Lifecycle::Requesting);
    let lenses = h.manager.lenses_for(&uri());
    assert_eq!(lenses.len(), 1);
    assert_eq!(lenses[0].line, 1);
    assert_eq!(lenses[0].title, "Requesting LLM");

    h.send(id, RewriteEvent::Started).await;
    assert_eq!(h.text(), format!("{prefix}\nrest();\n"));
    assert_eq!(h.manager.highlights_for(&uri()), Vec::new());

    h.chunk(id, "foo(bar)").await;
    h.chunk(id, " // safe\n").await;
    assert!(!h.manager.affordances().has_actions(id));
    h.send(id, RewriteEvent::Finished).await;

    assert_eq!(h.text(), format!("{prefix}foo(bar) // safe\n\nrest();\n"));
    let session = h.manager.session(id).unwrap();
    assert_eq!(session.lifecycle(), Lifecycle::Finished);
    assert_eq!(session.anchor(), 100);
    assert_eq!(session.applied_len(), 17);
    assert_eq!(
        h.manager.highlights_for(&uri()),
        vec![LineSpan { start: 1, end: 1 }]
    );
    assert_eq!(
        h.manager.affordances().highlight_of(id),
        Some(LineSpan { start: 1, end: 1 })
    );
    assert!(h.manager.affordances().has_actions(id));

    let lenses = h.manager.lenses_for(&uri());
    let commands: Vec<_> = lenses.iter().map(|lens| lens.command).collect();
    assert_eq!(
        commands,
        vec![
            LensCommand::Noop,
            LensCommand::Accept(id),
            LensCommand::Reject(id)
        ]
    );
    assert_eq!(lenses[0].title, HeaderLabel::Finished.title());
    assert!(lenses.iter().all(|lens| lens.line == 1));
}

#[tokio::test]
async fn batched_chunks_land_in_arrival_order() {
    let mut h = Harness::new("fn f() {\n    old();\n}\n");
    let id = h.trigger(13, 19).await;
    h.send(id, RewriteEvent::Started).await;

    let chunks = ["let ", "a", " = ", "1;", "\n    ", "new", "(a", ");"];
    let mut flushes = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        h.chunk(id, chunk).await;
        if i % 3 == 2 {
            flushes += h.fire_timers().await;
        }
    }
    h.send(id, RewriteEvent::Finished).await;

    assert_eq!(flushes, 2);
    assert_eq!(h.text(), "fn f() {\n    let a = 1;\n    new(a);\n}\n");
    assert_eq!(h.manager.session(id).unwrap().applied_len(), 22);
    assert_eq!(
        h.manager.highlights_for(&uri()),
        vec![LineSpan { start: 1, end: 2 }]
    );
}

#[tokio::test]
async fn every_flush_split_yields_the_same_text() {
    const ORIGINAL: &str = "let v = old;\n";
    let chunks = ["fn ", "", "é", "(x)", " {", "\n", "→→", "}"];
    let joined = chunks.concat();

    // Bit i set: the flush timer fires right after chunk i.
    for splits in 0u32..(1 << chunks.len()) {
        let mut h = Harness::new(ORIGINAL);
        let id = h.trigger(8, 11).await;
        h.send(id, RewriteEvent::Started).await;
        for (i, chunk) in chunks.iter().enumerate() {
            h.chunk(id, chunk).await;
            if splits & (1 << i) != 0 {
                h.fire_timers().await;
            }
        }
        h.send(id, RewriteEvent::Finished).await;

        assert_eq!(h.text(), format!("let v = {joined};\n"), "splits {splits:#010b}");
        assert_eq!(
            h.manager.session(id).unwrap().applied_len(),
            joined.chars().count(),
            "splits {splits:#010b}"
        );

        h.manager.reject(id).await.unwrap();
        assert_eq!(h.text(), ORIGINAL, "splits {splits:#010b}");
    }
}

#[tokio::test]
async fn text_before_started_waits_for_the_swap() {
    let mut h = Harness::new("a(b)");
    let id = h.trigger(0, 4).await;

    h.chunk(id, "c(d)").await;
    assert_eq!(h.fire_timers().await, 0);
    assert_eq!(h.text(), "a(b)");
    assert_eq!(h.manager.session(id).unwrap().pending_text(), "c(d)");

    h.send(id, RewriteEvent::Started).await;
    assert_eq!(h.fire_timers().await, 1);
    assert_eq!(h.text(), "c(d)");
    assert_eq!(h.manager.session(id).unwrap().pending_text(), "");
}

#[tokio::test]
async fn finished_without_started_still_swaps() {
    let mut h = Harness::new("x = old\n");
    let id = h.trigger(4, 7).await;

    h.chunk(id, "new").await;
    h.send(id, RewriteEvent::Finished).await;

    assert_eq!(h.text(), "x = new\n");
    assert_eq!(h.lifecycle(id), Lifecycle::Finished);
}

#[tokio::test]
async fn duplicate_finished_is_harmless() {
    let mut h = Harness::new("x = old\n");
    let id = h.trigger(4, 7).await;
    h.stream(id, &["new"]).await;
    let updates = h.manager.drain_updates().len();

    h.send(id, RewriteEvent::Finished).await;

    assert_eq!(h.text(), "x = new\n");
    assert_eq!(h.manager.drain_updates().len(), 0);
    assert!(updates > 0);
}

#[tokio::test]
async fn original_is_found_again_after_unreported_edit() {
    let mut h = Harness::new("call(one);\ncall(two);\n");
    let id = h.trigger(11, 21).await;

    // Something rewrote the file without telling us.
    h.doc_mut()
        .edit_unobserved(TextRange::at(0), "use x;\n")
        .unwrap();

    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "call(2);").await;
    h.fire_timers().await;

    assert_eq!(h.text(), "use x;\ncall(one);\ncall(2);\n");
    assert_eq!(h.manager.session(id).unwrap().anchor(), 18);
    assert_eq!(h.manager.lenses_for(&uri())[0].line, 2);
}

#[tokio::test]
async fn lost_original_ends_session_with_warning() {
    let mut h = Harness::new("call(one);\n");
    let id = h.trigger(0, 10).await;
    h.doc_mut()
        .edit_unobserved(TextRange::new(5, 8), "uno")
        .unwrap();

    h.send(id, RewriteEvent::Started).await;
    h.chunk(id, "ignored").await;

    assert_eq!(h.lifecycle(id), Lifecycle::Terminated);
    assert_eq!(h.text(), "call(uno);\n");
    assert!(h.manager.lenses_for(&uri()).is_empty());
    let notices = h.manager.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert!(notices[0].message.contains("document was modified"));
}

#[tokio::test]
async fn multibyte_text_is_measured_in_chars() {
    let mut h = Harness::new("«a»");
    let id = h.trigger(1, 2).await;
    h.stream(id, &["→", "é"]).await;

    assert_eq!(h.text(), "«→é»");
    assert_eq!(h.manager.session(id).unwrap().applied_len(), 2);
}
