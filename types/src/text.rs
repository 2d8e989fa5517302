//! Char-offset text geometry.
//!
//! Offsets count Unicode scalar values, not bytes. Lines are 0-indexed and
//! split on `\n`; `character` counts scalar values from the start of the line.

use std::iter;

use serde::{Deserialize, Serialize};

/// A line/character position inside a document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open `[start, end)` range of char offsets.
///
/// Construction normalizes reversed bounds, so `start() <= end()` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextRange {
    start: usize,
    end: usize,
}

impl TextRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Empty range positioned at `offset`.
    #[must_use]
    pub fn at(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    #[must_use]
    pub fn with_len(start: usize, len: usize) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    #[must_use]
    pub fn start(self) -> usize {
        self.start
    }

    #[must_use]
    pub fn end(self) -> usize {
        self.end
    }

    #[must_use]
    pub fn len(self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Whether `other` touches the inside of this range.
    ///
    /// Ranges that merely abut (`other.end == self.start` or
    /// `other.start == self.end`) do not intersect, and an empty range only
    /// intersects when it sits strictly inside.
    #[must_use]
    pub fn intersects(self, other: TextRange) -> bool {
        !(other.end <= self.start || other.start >= self.end)
    }
}

/// Number of chars in `text`.
#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the char at `offset`.
///
/// `offset == char_len(text)` maps to `text.len()`; anything past that is `None`.
#[must_use]
pub fn byte_index(text: &str, offset: usize) -> Option<usize> {
    text.char_indices()
        .map(|(idx, _)| idx)
        .chain(iter::once(text.len()))
        .nth(offset)
}

/// Borrow the chars covered by `range`, or `None` if it runs past the end.
#[must_use]
pub fn slice(text: &str, range: TextRange) -> Option<&str> {
    let start = byte_index(text, range.start())?;
    let end = byte_index(text, range.end())?;
    text.get(start..end)
}

/// Position of `offset`, clamped to the end of `text`.
#[must_use]
pub fn position_at(text: &str, offset: usize) -> Position {
    let mut pos = Position::default();
    for ch in text.chars().take(offset) {
        if ch == '\n' {
            pos.line += 1;
            pos.character = 0;
        } else {
            pos.character += 1;
        }
    }
    pos
}

/// Offset of `position`, clamped to the end of its line (or of `text`).
#[must_use]
pub fn offset_at(text: &str, position: Position) -> usize {
    let mut chars = text.chars();
    let mut offset = 0;
    let mut line = 0;
    while line < position.line {
        match chars.next() {
            Some('\n') => {
                line += 1;
                offset += 1;
            }
            Some(_) => offset += 1,
            None => return offset,
        }
    }
    let mut character = 0;
    while character < position.character {
        match chars.next() {
            Some('\n') | None => break,
            Some(_) => {
                offset += 1;
                character += 1;
            }
        }
    }
    offset
}

/// Char offsets of every occurrence of `needle`, overlapping ones included.
#[must_use]
pub fn find_all(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .char_indices()
        .enumerate()
        .filter(|(_, (byte_idx, _))| haystack[*byte_idx..].starts_with(needle))
        .map(|(char_idx, _)| char_idx)
        .collect()
}
