use super::{CursorEvent, EditOperation, EditOrigin, Position, Selection, TextBuffer};
use crate::error::BufferError;
use tokio::sync::mpsc;

const MAX_UNDO_STACK: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub text: String,
    pub selection: Selection,
}

/// In-memory text buffer with a single selection and undo history.
///
/// Consecutive programmatic edits share one undo step, so a streamed insert
/// is undone as a whole.
#[derive(Debug, Default)]
pub struct Document {
    text: String,
    selection: Selection,
    cursor_listeners: Vec<mpsc::UnboundedSender<CursorEvent>>,
    undo_stack: Vec<DocumentSnapshot>,
    redo_stack: Vec<DocumentSnapshot>,
    programmatic_group: bool,
}

struct ResolvedEdit<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    force_move_markers: bool,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            text: self.text.clone(),
            selection: self.selection,
        }
    }

    /// Selects `anchor..head` as the user would with the mouse.
    pub fn select(&mut self, anchor: usize, head: usize) {
        let len = self.len_chars();
        self.set_selection(
            Selection {
                anchor: anchor.min(len),
                head: head.min(len),
            },
            EditOrigin::User,
        );
    }

    pub fn move_caret(&mut self, offset: usize) {
        let offset = offset.min(self.len_chars());
        self.set_selection(Selection::caret(offset), EditOrigin::User);
    }

    /// Replaces the selection with `value`, leaving the caret after it.
    pub fn type_text(&mut self, value: &str) -> Result<(), BufferError> {
        let range = super::TextRange::new(
            self.position_at(self.selection.start()),
            self.position_at(self.selection.end()),
        );
        let edit = EditOperation {
            range,
            text: value.to_string(),
            force_move_markers: true,
        };
        self.apply_edits(&[edit], EditOrigin::User)?;
        let caret = self.selection.head;
        self.set_selection(Selection::caret(caret), EditOrigin::User);
        Ok(())
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn undo(&mut self) -> bool {
        self.programmatic_group = false;
        let Some(previous) = self.undo_stack.pop() else {
            return false;
        };
        self.redo_stack.push(self.snapshot());
        self.restore(previous);
        true
    }

    pub fn redo(&mut self) -> bool {
        self.programmatic_group = false;
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack.push(self.snapshot());
        self.restore(next);
        true
    }

    fn save_undo_snapshot(&mut self) {
        self.undo_stack.push(self.snapshot());
        if self.undo_stack.len() > MAX_UNDO_STACK {
            self.undo_stack.remove(0);
        }
    }

    fn restore(&mut self, snap: DocumentSnapshot) {
        self.text = snap.text;
        let len = self.len_chars();
        self.set_selection(
            Selection {
                anchor: snap.selection.anchor.min(len),
                head: snap.selection.head.min(len),
            },
            EditOrigin::User,
        );
    }

    fn set_selection(&mut self, selection: Selection, origin: EditOrigin) {
        if self.selection == selection {
            return;
        }
        let moved = self.selection.head != selection.head;
        self.selection = selection;
        if moved {
            self.notify_cursor(origin);
        }
    }

    fn notify_cursor(&mut self, origin: EditOrigin) {
        let event = CursorEvent {
            offset: self.selection.head,
            origin,
        };
        self.cursor_listeners.retain(|tx| tx.send(event).is_ok());
    }

    fn byte_index(&self, offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(offset)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len())
    }

    fn checked_offset(&self, position: Position) -> Result<usize, BufferError> {
        let mut offset = 0usize;
        for (line_index, line) in self.text.split('\n').enumerate() {
            let line_len = line.chars().count();
            if line_index == position.line {
                if position.column > line_len {
                    break;
                }
                return Ok(offset + position.column);
            }
            offset += line_len + 1;
        }
        Err(BufferError::PositionOutOfBounds {
            line: position.line,
            column: position.column,
        })
    }

    fn resolve_edits<'a>(
        &self,
        edits: &'a [EditOperation],
    ) -> Result<Vec<ResolvedEdit<'a>>, BufferError> {
        let mut resolved = edits
            .iter()
            .map(|edit| {
                let a = self.checked_offset(edit.range.start)?;
                let b = self.checked_offset(edit.range.end)?;
                Ok(ResolvedEdit {
                    start: a.min(b),
                    end: a.max(b),
                    text: edit.text.as_str(),
                    force_move_markers: edit.force_move_markers,
                })
            })
            .collect::<Result<Vec<_>, BufferError>>()?;
        resolved.sort_by_key(|edit| (edit.start, edit.end));
        for pair in resolved.windows(2) {
            if pair[0].end > pair[1].start {
                return Err(BufferError::OverlappingEdits);
            }
        }
        Ok(resolved)
    }
}

fn shift_marker(marker: usize, edit: &ResolvedEdit<'_>) -> usize {
    let inserted = edit.text.chars().count();
    if marker < edit.start {
        marker
    } else if marker > edit.end {
        marker - (edit.end - edit.start) + inserted
    } else if marker == edit.start {
        if edit.force_move_markers {
            edit.start + inserted
        } else {
            edit.start
        }
    } else {
        edit.start + inserted
    }
}

impl TextBuffer for Document {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn len_chars(&self) -> usize {
        self.text.chars().count()
    }

    fn selection(&self) -> Selection {
        self.selection
    }

    fn position_at(&self, offset: usize) -> Position {
        let mut position = Position::default();
        for ch in self.text.chars().take(offset) {
            if ch == '\n' {
                position.line += 1;
                position.column = 0;
            } else {
                position.column += 1;
            }
        }
        position
    }

    fn offset_at(&self, position: Position) -> usize {
        let mut offset = 0usize;
        for (line_index, line) in self.text.split('\n').enumerate() {
            let line_len = line.chars().count();
            if line_index == position.line {
                return offset + position.column.min(line_len);
            }
            offset += line_len + 1;
        }
        self.len_chars()
    }

    fn apply_edits(
        &mut self,
        edits: &[EditOperation],
        origin: EditOrigin,
    ) -> Result<(), BufferError> {
        if edits.is_empty() {
            return Ok(());
        }
        let resolved = self.resolve_edits(edits)?;

        let programmatic = origin == EditOrigin::Programmatic;
        if !(programmatic && self.programmatic_group) {
            self.save_undo_snapshot();
        }
        self.programmatic_group = programmatic;
        self.redo_stack.clear();

        let mut selection = self.selection;
        for edit in resolved.iter().rev() {
            let start = self.byte_index(edit.start);
            let end = self.byte_index(edit.end);
            self.text.replace_range(start..end, edit.text);
            selection.anchor = shift_marker(selection.anchor, edit);
            selection.head = shift_marker(selection.head, edit);
        }
        self.set_selection(selection, origin);
        Ok(())
    }

    fn set_caret(&mut self, position: Position, origin: EditOrigin) {
        let offset = self.offset_at(position);
        self.set_selection(Selection::caret(offset), origin);
    }

    fn subscribe_cursor(&mut self) -> mpsc::UnboundedReceiver<CursorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.cursor_listeners.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextRange;

    #[test]
    fn test_position_and_offset_mapping_handles_multibyte_text() {
        let doc = Document::new("héllo\nwörld");
        assert_eq!(doc.position_at(7), Position::new(1, 1));
        assert_eq!(doc.offset_at(Position::new(1, 1)), 7);
        assert_eq!(doc.position_at(500), Position::new(1, 5));
        assert_eq!(doc.offset_at(Position::new(9, 0)), doc.len_chars());
        assert_eq!(doc.offset_at(Position::new(0, 99)), 5);
    }

    #[test]
    fn test_force_move_markers_pushes_caret_past_insert() {
        let mut doc = Document::new("ab");
        doc.move_caret(1);
        doc.apply_edits(
            &[EditOperation::insert(Position::new(0, 1), "XY", true)],
            EditOrigin::Programmatic,
        )
        .unwrap();
        assert_eq!(doc.as_str(), "aXYb");
        assert_eq!(doc.caret(), 3);

        doc.apply_edits(
            &[EditOperation::insert(Position::new(0, 3), "--", false)],
            EditOrigin::Programmatic,
        )
        .unwrap();
        assert_eq!(doc.as_str(), "aXY--b");
        assert_eq!(doc.caret(), 3);
    }

    #[test]
    fn test_multi_edit_batch_is_atomic() {
        let mut doc = Document::new("one two three");
        let result = doc.apply_edits(
            &[
                EditOperation::replace(
                    TextRange::new(Position::new(0, 0), Position::new(0, 3)),
                    "1",
                ),
                EditOperation::replace(
                    TextRange::new(Position::new(0, 2), Position::new(0, 6)),
                    "2",
                ),
            ],
            EditOrigin::Programmatic,
        );
        assert!(matches!(result, Err(BufferError::OverlappingEdits)));
        assert_eq!(doc.as_str(), "one two three");

        doc.apply_edits(
            &[
                EditOperation::replace(
                    TextRange::new(Position::new(0, 8), Position::new(0, 13)),
                    "3",
                ),
                EditOperation::replace(
                    TextRange::new(Position::new(0, 0), Position::new(0, 3)),
                    "1",
                ),
            ],
            EditOrigin::Programmatic,
        )
        .unwrap();
        assert_eq!(doc.as_str(), "1 two 3");
    }

    #[test]
    fn test_invalid_position_is_rejected() {
        let mut doc = Document::new("abc");
        let result = doc.apply_edits(
            &[EditOperation::insert(Position::new(0, 4), "x", false)],
            EditOrigin::User,
        );
        assert!(matches!(
            result,
            Err(BufferError::PositionOutOfBounds { line: 0, column: 4 })
        ));
    }

    #[test]
    fn test_cursor_events_carry_origin() {
        let mut doc = Document::new("hello");
        let mut rx = doc.subscribe_cursor();

        doc.move_caret(2);
        doc.set_caret(Position::new(0, 4), EditOrigin::Programmatic);
        doc.set_caret(Position::new(0, 4), EditOrigin::Programmatic);

        assert_eq!(
            rx.try_recv().unwrap(),
            CursorEvent {
                offset: 2,
                origin: EditOrigin::User
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            CursorEvent {
                offset: 4,
                origin: EditOrigin::Programmatic
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let mut doc = Document::new("abc");
        let rx = doc.subscribe_cursor();
        drop(rx);
        doc.move_caret(1);
        assert!(doc.cursor_listeners.is_empty());
    }

    #[test]
    fn test_type_text_replaces_selection_and_supports_undo() {
        let mut doc = Document::new("say foo now");
        doc.select(4, 7);
        doc.type_text("bar").unwrap();
        assert_eq!(doc.as_str(), "say bar now");
        assert_eq!(doc.selection(), Selection::caret(7));

        assert!(doc.undo());
        assert_eq!(doc.as_str(), "say foo now");
        assert!(doc.redo());
        assert_eq!(doc.as_str(), "say bar now");
        assert!(!doc.redo());
    }

    #[test]
    fn test_programmatic_edits_share_one_undo_step() {
        let mut doc = Document::new("ab");
        doc.type_text("x").unwrap();
        for piece in ["one ", "two ", "three"] {
            let at = doc.position_at(doc.len_chars());
            doc.apply_edits(
                &[EditOperation::insert(at, piece, true)],
                EditOrigin::Programmatic,
            )
            .unwrap();
        }
        assert_eq!(doc.as_str(), "xabone two three");
        assert_eq!(doc.undo_depth(), 2);

        assert!(doc.undo());
        assert_eq!(doc.as_str(), "xab");
        assert!(doc.undo());
        assert_eq!(doc.as_str(), "ab");
    }

    #[test]
    fn test_undo_history_is_capped() {
        let mut doc = Document::new("");
        for _ in 0..150 {
            doc.type_text("a").unwrap();
        }
        assert_eq!(doc.undo_depth(), 100);
        while doc.undo() {}
        assert_eq!(doc.as_str(), "a".repeat(50));
    }

    #[test]
    fn test_deleting_range_collapses_markers_inside_it() {
        let mut doc = Document::new("abcdef");
        doc.move_caret(4);
        doc.apply_edits(
            &[EditOperation::delete(TextRange::new(
                Position::new(0, 2),
                Position::new(0, 5),
            ))],
            EditOrigin::Programmatic,
        )
        .unwrap();
        assert_eq!(doc.as_str(), "abf");
        assert_eq!(doc.caret(), 2);
    }
}
