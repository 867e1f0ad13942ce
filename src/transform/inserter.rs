use super::reassembler::post_boundary_text;
use super::sanitize::{normalize_line_endings, sanitize};
use super::segment::segment;
use crate::buffer::{
    CursorEvent, EditOperation, EditOrigin, Selection, SharedBuffer, TextBuffer, TextRange,
};
use crate::error::TransformError;
use std::sync::{Arc, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// No selection: text is streamed in at the caret as it arrives.
    Stream,
    /// The selection `start..end` is replaced once the run completes.
    ReplaceSelection { start: usize, end: usize },
}

/// Applies cleaned output to the buffer for one run.
///
/// Every edit and caret move it makes is tagged [`EditOrigin::Programmatic`];
/// any [`EditOrigin::User`] cursor event seen on its subscription stops the
/// caret from following the insertion point for the rest of the run.
pub struct IncrementalInserter {
    buffer: SharedBuffer,
    mode: InsertMode,
    insert_offset: usize,
    inserted_any: bool,
    output: String,
    user_moved: bool,
    cursor_events: mpsc::UnboundedReceiver<CursorEvent>,
    segment_size: usize,
}

impl IncrementalInserter {
    pub fn new(
        buffer: SharedBuffer,
        selection: Selection,
        segment_size: usize,
    ) -> Result<Self, TransformError> {
        let cursor_events = lock_buffer(&buffer)?.subscribe_cursor();
        let mode = if selection.is_empty() {
            InsertMode::Stream
        } else {
            InsertMode::ReplaceSelection {
                start: selection.start(),
                end: selection.end(),
            }
        };
        Ok(Self {
            buffer,
            mode,
            insert_offset: selection.start(),
            inserted_any: false,
            output: String::new(),
            user_moved: false,
            cursor_events,
            segment_size,
        })
    }

    pub fn mode(&self) -> InsertMode {
        self.mode
    }

    pub fn has_selection(&self) -> bool {
        matches!(self.mode, InsertMode::ReplaceSelection { .. })
    }

    pub fn insert_offset(&self) -> usize {
        self.insert_offset
    }

    pub fn inserted_any(&self) -> bool {
        self.inserted_any
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn user_moved(&mut self) -> bool {
        self.refresh_user_moved();
        self.user_moved
    }

    pub fn on_sanitized_slice(&mut self, slice: &str) -> Result<(), TransformError> {
        if self.has_selection() {
            return Ok(());
        }
        let slice = if self.inserted_any {
            slice
        } else {
            slice.trim_start()
        };
        if slice.is_empty() {
            return Ok(());
        }
        self.insert_segmented(slice)?;
        self.inserted_any = true;
        self.output.push_str(slice);
        Ok(())
    }

    /// Final step of a successful run. Returns the text the run leaves behind.
    ///
    /// Once anything was streamed the streamed text is authoritative;
    /// otherwise the sanitized full output is used.
    pub fn finish(mut self, full_output: &str) -> Result<String, TransformError> {
        self.refresh_user_moved();
        let streamed = !self.output.is_empty();
        let final_text = if streamed {
            self.output.clone()
        } else {
            let body =
                post_boundary_text(full_output).unwrap_or_else(|| full_output.to_string());
            sanitize(&body)
        };
        let final_text = normalize_line_endings(&final_text);

        match self.mode {
            InsertMode::ReplaceSelection { start, end } => {
                self.replace_selection(start, end, final_text.trim())
            }
            InsertMode::Stream if !streamed => {
                let text = final_text.trim();
                if text.is_empty() {
                    return Ok(String::new());
                }
                self.insert_segmented(text)?;
                self.inserted_any = true;
                self.output.push_str(text);
                Ok(text.to_string())
            }
            InsertMode::Stream => self.trim_trailing_whitespace(&final_text),
        }
    }

    fn insert_segmented(&mut self, text: &str) -> Result<(), TransformError> {
        self.refresh_user_moved();
        let buffer = Arc::clone(&self.buffer);
        let mut guard = lock_buffer(&buffer)?;
        self.insert_offset = self.insert_offset.min(guard.len_chars());

        for piece in segment(text, self.segment_size) {
            let at = guard.position_at(self.insert_offset);
            guard.apply_edits(
                &[EditOperation::insert(at, piece, true)],
                EditOrigin::Programmatic,
            )?;
            self.insert_offset += piece.chars().count();
        }

        self.follow_caret(&mut guard);
        Ok(())
    }

    fn replace_selection(
        &mut self,
        start: usize,
        end: usize,
        text: &str,
    ) -> Result<String, TransformError> {
        // An empty result never wipes out the user's selection.
        if text.is_empty() {
            return Ok(String::new());
        }
        let buffer = Arc::clone(&self.buffer);
        let mut guard = lock_buffer(&buffer)?;
        let len = guard.len_chars();
        let (start, end) = (start.min(len), end.min(len));
        let range = TextRange::new(guard.position_at(start), guard.position_at(end));
        guard.apply_edits(
            &[EditOperation::replace(range, text)],
            EditOrigin::Programmatic,
        )?;
        self.insert_offset = start + text.chars().count();
        self.inserted_any = true;
        self.output = text.to_string();
        self.follow_caret(&mut guard);
        Ok(text.to_string())
    }

    fn trim_trailing_whitespace(&mut self, final_text: &str) -> Result<String, TransformError> {
        let trailing = final_text
            .chars()
            .rev()
            .take_while(|ch| ch.is_whitespace())
            .count()
            .min(self.insert_offset);
        let kept = final_text.trim_end().to_string();
        if trailing == 0 {
            return Ok(kept);
        }

        let buffer = Arc::clone(&self.buffer);
        let mut guard = lock_buffer(&buffer)?;
        let start = self.insert_offset - trailing;
        let range = TextRange::new(
            guard.position_at(start),
            guard.position_at(self.insert_offset),
        );
        guard.apply_edits(&[EditOperation::delete(range)], EditOrigin::Programmatic)?;
        self.insert_offset = start;
        self.output = kept.clone();
        self.follow_caret(&mut guard);
        Ok(kept)
    }

    fn follow_caret(&mut self, guard: &mut MutexGuard<'_, dyn TextBuffer + 'static>) {
        self.refresh_user_moved();
        if self.user_moved {
            return;
        }
        let caret = guard.position_at(self.insert_offset);
        guard.set_caret(caret, EditOrigin::Programmatic);
    }

    fn refresh_user_moved(&mut self) {
        while let Ok(event) = self.cursor_events.try_recv() {
            if event.origin == EditOrigin::User {
                self.user_moved = true;
            }
        }
    }
}

pub(crate) fn lock_buffer(
    buffer: &SharedBuffer,
) -> Result<MutexGuard<'_, dyn TextBuffer + 'static>, TransformError> {
    buffer.lock().map_err(|_| TransformError::BufferPoisoned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Document;
    use std::sync::Mutex;

    fn shared(doc: Document) -> (Arc<Mutex<Document>>, SharedBuffer) {
        let doc = Arc::new(Mutex::new(doc));
        let buffer: SharedBuffer = doc.clone();
        (doc, buffer)
    }

    fn caret_doc(text: &str, caret: usize) -> (Arc<Mutex<Document>>, SharedBuffer) {
        let mut doc = Document::new(text);
        doc.move_caret(caret);
        shared(doc)
    }

    #[test]
    fn test_streaming_follows_caret() {
        let (doc, buffer) = caret_doc("ab", 1);
        let selection = doc.lock().unwrap().selection();
        let mut inserter = IncrementalInserter::new(buffer, selection, 4).unwrap();

        inserter.on_sanitized_slice("  hello ").unwrap();
        inserter.on_sanitized_slice("world\n").unwrap();

        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "ahello world\nb");
        assert_eq!(inserter.insert_offset(), 1 + "hello world\n".len());
        assert_eq!(doc.caret(), inserter.insert_offset());
        assert_eq!(inserter.output(), "hello world\n");
    }

    #[test]
    fn test_leading_whitespace_only_slices_are_skipped() {
        let (doc, buffer) = caret_doc("", 0);
        let mut inserter = IncrementalInserter::new(buffer, Selection::caret(0), 24).unwrap();

        inserter.on_sanitized_slice("\n\n  ").unwrap();
        assert!(!inserter.inserted_any());
        inserter.on_sanitized_slice("\nX\n").unwrap();
        inserter.on_sanitized_slice("\n").unwrap();

        assert!(inserter.inserted_any());
        assert_eq!(doc.lock().unwrap().as_str(), "X\n\n");
    }

    #[test]
    fn test_user_move_stops_caret_follow() {
        let (doc, buffer) = caret_doc("0123456789", 2);
        let mut inserter = IncrementalInserter::new(buffer, Selection::caret(2), 24).unwrap();

        inserter.on_sanitized_slice("AA").unwrap();
        assert_eq!(doc.lock().unwrap().caret(), 4);

        doc.lock().unwrap().move_caret(9);
        inserter.on_sanitized_slice("BB").unwrap();
        inserter.on_sanitized_slice("CC").unwrap();

        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "01AABBCC23456789");
        // Inserts before the caret shift it, but never pull it to the insertion point.
        assert_eq!(doc.caret(), 13);
        assert!(inserter.user_moved());
    }

    #[test]
    fn test_selection_mode_ignores_slices_and_replaces_on_finish() {
        let (doc, buffer) = shared(Document::new("say foo now"));
        doc.lock().unwrap().select(4, 7);
        let selection = doc.lock().unwrap().selection();
        let mut inserter = IncrementalInserter::new(buffer, selection, 24).unwrap();

        inserter.on_sanitized_slice("ignored").unwrap();
        assert_eq!(doc.lock().unwrap().as_str(), "say foo now");

        let final_text = inserter.finish("  BAR  ").unwrap();
        assert_eq!(final_text, "BAR");
        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "say BAR now");
        assert_eq!(doc.caret(), 7);
    }

    #[test]
    fn test_empty_result_keeps_selection() {
        let (doc, buffer) = shared(Document::new("keep me"));
        doc.lock().unwrap().select(0, 4);
        let selection = Selection { anchor: 0, head: 4 };
        let inserter = IncrementalInserter::new(buffer, selection, 24).unwrap();

        assert_eq!(inserter.finish("```\n```\n").unwrap(), "");
        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "keep me");
        assert_eq!(doc.selection(), Selection { anchor: 0, head: 4 });
    }

    #[test]
    fn test_finish_without_streaming_inserts_sanitized_output() {
        let (doc, buffer) = caret_doc("[]", 1);
        let inserter = IncrementalInserter::new(buffer, Selection::caret(1), 3).unwrap();

        let final_text = inserter
            .finish("prompt echo\n--- INPUT END ---\nReturn only the transformed text.\n```\nnew body\n```\n")
            .unwrap();

        assert_eq!(final_text, "new body");
        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "[new body]");
        assert_eq!(doc.caret(), 9);
    }

    #[test]
    fn test_finish_after_streaming_trims_trailing_whitespace() {
        let (doc, buffer) = caret_doc("<>", 1);
        let mut inserter = IncrementalInserter::new(buffer, Selection::caret(1), 24).unwrap();
        inserter.on_sanitized_slice("HELLO \n\n").unwrap();

        let final_text = inserter.finish("ignored full output").unwrap();

        assert_eq!(final_text, "HELLO");
        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "<HELLO>");
        assert_eq!(doc.caret(), 6);
    }

    #[test]
    fn test_trailing_trim_respects_user_moved_caret() {
        let (doc, buffer) = caret_doc("xy", 2);
        let mut inserter = IncrementalInserter::new(buffer, Selection::caret(2), 24).unwrap();
        inserter.on_sanitized_slice("done  ").unwrap();
        doc.lock().unwrap().move_caret(0);

        inserter.finish("").unwrap();

        let doc = doc.lock().unwrap();
        assert_eq!(doc.as_str(), "xydone");
        assert_eq!(doc.caret(), 0);
    }
}
