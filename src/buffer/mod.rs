//! Text buffer contract consumed by the transform pipeline.
//!
//! Offsets are counted in `char`s. Positions are 0-based `(line, column)`
//! pairs, with columns also counted in `char`s.

mod document;

pub use document::{Document, DocumentSnapshot};

use crate::error::BufferError;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Position) -> Self {
        Self { start: at, end: at }
    }
}

/// Anchor and head offsets; the head is where the caret is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn caret(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOperation {
    pub range: TextRange,
    pub text: String,
    /// Markers sitting exactly at the edit start end up after the inserted text.
    pub force_move_markers: bool,
}

impl EditOperation {
    pub fn insert(at: Position, text: impl Into<String>, force_move_markers: bool) -> Self {
        Self {
            range: TextRange::collapsed(at),
            text: text.into(),
            force_move_markers,
        }
    }

    pub fn replace(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
            force_move_markers: false,
        }
    }

    pub fn delete(range: TextRange) -> Self {
        Self::replace(range, "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    User,
    Programmatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorEvent {
    pub offset: usize,
    pub origin: EditOrigin,
}

pub trait TextBuffer: Send {
    fn text(&self) -> String;

    fn len_chars(&self) -> usize;

    fn selection(&self) -> Selection;

    fn caret(&self) -> usize {
        self.selection().head
    }

    /// Clamps past-the-end offsets to the end of the buffer.
    fn position_at(&self, offset: usize) -> Position;

    /// Clamps unknown lines and columns to the nearest valid offset.
    fn offset_at(&self, position: Position) -> usize;

    /// Applies every operation or none of them.
    fn apply_edits(
        &mut self,
        edits: &[EditOperation],
        origin: EditOrigin,
    ) -> Result<(), BufferError>;

    fn set_caret(&mut self, position: Position, origin: EditOrigin);

    /// Every caret move, explicit or caused by an edit, tagged with its origin.
    fn subscribe_cursor(&mut self) -> mpsc::UnboundedReceiver<CursorEvent>;
}

pub type SharedBuffer = Arc<Mutex<dyn TextBuffer>>;
