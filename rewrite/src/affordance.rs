//! Affordance Controller: lenses and highlights for live sessions.
//!
//! The controller keeps only what each session asked to show and where. The
//! host pulls [`Lens`]es and highlight spans per document and maps anchor
//! offsets to lines against the document as it is at that moment.

use std::collections::BTreeMap;

use eca_types::text::TextRange;
use eca_types::{DocumentUri, RewriteId};

use crate::surface::EditSurface;

/// Header text shown above a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLabel {
    Requesting,
    Reasoning,
    Rewriting,
    Finished,
}

impl HeaderLabel {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Requesting => "Requesting LLM",
            Self::Reasoning => "LLM reasoning",
            Self::Rewriting => "Rewriting",
            Self::Finished => "Rewrite",
        }
    }
}

/// What clicking a lens does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensCommand {
    /// A label; clicking does nothing.
    Noop,
    Accept(RewriteId),
    Reject(RewriteId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lens {
    /// 0-based line; lenses sit at column 0.
    pub line: u32,
    pub title: &'static str,
    pub command: LensCommand,
}

/// Whole lines covered by a highlight, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug)]
struct LensEntry {
    uri: DocumentUri,
    anchor: usize,
    label: HeaderLabel,
    actions: bool,
}

#[derive(Debug, Default)]
pub struct Affordances {
    lenses: BTreeMap<RewriteId, LensEntry>,
    highlights: BTreeMap<RewriteId, (DocumentUri, LineSpan)>,
}

impl Affordances {
    pub(crate) fn show(&mut self, id: RewriteId, uri: DocumentUri, anchor: usize) {
        self.lenses.insert(
            id,
            LensEntry {
                uri,
                anchor,
                label: HeaderLabel::Requesting,
                actions: false,
            },
        );
    }

    pub(crate) fn set_label(&mut self, id: RewriteId, label: HeaderLabel) {
        if let Some(entry) = self.lenses.get_mut(&id) {
            entry.label = label;
        }
    }

    pub(crate) fn move_anchor(&mut self, id: RewriteId, anchor: usize) {
        if let Some(entry) = self.lenses.get_mut(&id) {
            entry.anchor = anchor;
        }
    }

    /// Switch to the finished header and reveal Accept/Reject.
    pub(crate) fn show_actions(&mut self, id: RewriteId) {
        if let Some(entry) = self.lenses.get_mut(&id) {
            entry.label = HeaderLabel::Finished;
            entry.actions = true;
        }
    }

    /// Set or clear (`None`) the highlight of a session.
    pub(crate) fn highlight(&mut self, id: RewriteId, uri: &DocumentUri, span: Option<LineSpan>) {
        match span {
            Some(span) => {
                self.highlights.insert(id, (uri.clone(), span));
            }
            None => {
                self.highlights.remove(&id);
            }
        }
    }

    /// Drop everything the session shows.
    pub(crate) fn clear(&mut self, id: RewriteId) {
        self.lenses.remove(&id);
        self.highlights.remove(&id);
    }

    #[must_use]
    pub fn label(&self, id: RewriteId) -> Option<HeaderLabel> {
        self.lenses.get(&id).map(|entry| entry.label)
    }

    #[must_use]
    pub fn has_actions(&self, id: RewriteId) -> bool {
        self.lenses.get(&id).is_some_and(|entry| entry.actions)
    }

    #[must_use]
    pub fn highlight_of(&self, id: RewriteId) -> Option<LineSpan> {
        self.highlights.get(&id).map(|(_, span)| *span)
    }

    /// Lenses for `doc`, ordered by line: each session's header, followed by
    /// Accept and Reject once it has finished.
    pub fn lenses_for<D: EditSurface>(&self, doc: &D) -> Vec<Lens> {
        let mut out = Vec::new();
        for (id, entry) in self.lenses.iter().filter(|(_, e)| &e.uri == doc.uri()) {
            let line = doc.position_at(entry.anchor).line;
            out.push(Lens {
                line,
                title: entry.label.title(),
                command: LensCommand::Noop,
            });
            if entry.actions {
                out.push(Lens {
                    line,
                    title: "Accept",
                    command: LensCommand::Accept(*id),
                });
                out.push(Lens {
                    line,
                    title: "Reject",
                    command: LensCommand::Reject(*id),
                });
            }
        }
        out.sort_by_key(|lens| lens.line);
        out
    }

    pub fn highlights_for(&self, uri: &DocumentUri) -> Vec<LineSpan> {
        let mut spans: Vec<_> = self
            .highlights
            .values()
            .filter(|(owner, _)| owner == uri)
            .map(|(_, span)| *span)
            .collect();
        spans.sort_by_key(|span| span.start);
        spans
    }
}

/// Lines touched by `region`, or `None` for an empty region.
///
/// A region ending right after a newline does not reach onto the next line.
pub(crate) fn covered_lines<D: EditSurface>(doc: &D, region: TextRange) -> Option<LineSpan> {
    if region.is_empty() {
        return None;
    }
    Some(LineSpan {
        start: doc.position_at(region.start()).line,
        end: doc.position_at(region.end() - 1).line,
    })
}

/// How an edit relates to the region a session owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Impact {
    /// Touches the inside of the region.
    Interferes,
    /// Lies entirely before the region; the anchor moves by this many chars.
    Shifts(isize),
    Unaffected,
}

/// `delta` is the signed change in document length the edit of `edited` caused.
pub(crate) fn impact_of(region: TextRange, edited: TextRange, delta: isize) -> Impact {
    if region.intersects(edited) {
        Impact::Interferes
    } else if edited.end() <= region.start() {
        match delta {
            0 => Impact::Unaffected,
            delta => Impact::Shifts(delta),
        }
    } else {
        Impact::Unaffected
    }
}
