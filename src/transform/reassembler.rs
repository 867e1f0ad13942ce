//! Reconstructs model output from arbitrarily split process output.
//!
//! Everything up to the input/output boundary marker is the tool echoing the
//! prompt back and is discarded. After it, everything received is released
//! except a trailing partial line that may still grow into a noise line; that
//! line waits for its newline or for [`StreamReassembler::finish`].

use super::sanitize::{may_become_noise, normalize_line_endings};
use regex::Regex;
use std::sync::LazyLock;

/// Characters of pre-boundary output retained between chunks.
pub const DEFAULT_TAIL_WINDOW: usize = 512;

static BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-{3}\s*input\s+end\s*-{3}").expect("invalid boundary regex"));

static MARKER_LINE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\n").expect("invalid marker line regex"));

static LEADING_GUIDANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*return\s+only\s+the\s+transformed\s+text\.?[ \t]*(?:\n|$)")
        .expect("invalid guidance regex")
});

static LEADING_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[\d{4}-\d{2}-\d{2}[^\]\n]*\][^\n]*(?:\n|$)").expect("invalid timestamp regex")
});

static LEADING_PRODUCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*codex[ \t]*(?:\n|$)").expect("invalid product regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    SeekingBoundary,
    /// Boundary seen; the leading guidance and log lines are not settled yet.
    Preamble,
    Streaming,
}

#[derive(Debug, Clone)]
pub struct StreamReassembler {
    pending: String,
    phase: Phase,
    carry_cr: bool,
    /// The last released text ended mid-line.
    line_open: bool,
    tail_window: usize,
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::with_tail_window(DEFAULT_TAIL_WINDOW)
    }

    pub fn with_tail_window(tail_window: usize) -> Self {
        Self {
            pending: String::new(),
            phase: Phase::SeekingBoundary,
            carry_cr: false,
            line_open: false,
            tail_window: tail_window.max(1),
        }
    }

    pub fn boundary_found(&self) -> bool {
        self.phase != Phase::SeekingBoundary
    }

    /// Characters currently held back.
    pub fn retained_len(&self) -> usize {
        self.pending.chars().count()
    }

    /// Feeds one raw chunk; returns post-boundary text that is ready, or "".
    pub fn push(&mut self, raw: &str) -> String {
        let normalized = self.normalize_chunk(raw);
        self.pending.push_str(&normalized);

        if self.phase == Phase::SeekingBoundary {
            let Some(marker) = BOUNDARY.find(&self.pending) else {
                self.truncate_to_window();
                return String::new();
            };
            let marker_end = marker.end();
            self.pending.drain(..marker_end);
            self.phase = Phase::Preamble;
        }

        if self.phase == Phase::Preamble {
            if !preamble_settled(&self.pending) {
                return String::new();
            }
            self.strip_preamble(false);
            self.phase = Phase::Streaming;
        }

        self.take_ready()
    }

    /// Releases whatever is still held once the stream has ended.
    pub fn finish(&mut self) -> String {
        if std::mem::take(&mut self.carry_cr) {
            self.pending.push('\n');
        }
        match self.phase {
            Phase::SeekingBoundary => {
                self.pending.clear();
                String::new()
            }
            Phase::Preamble => {
                self.strip_preamble(true);
                self.phase = Phase::Streaming;
                std::mem::take(&mut self.pending)
            }
            Phase::Streaming => std::mem::take(&mut self.pending),
        }
    }

    fn normalize_chunk(&mut self, raw: &str) -> String {
        let mut text = String::with_capacity(raw.len() + 1);
        if std::mem::take(&mut self.carry_cr) {
            text.push('\r');
        }
        text.push_str(raw);
        // A lone trailing CR may be the first half of a CRLF pair.
        if text.ends_with('\r') {
            text.pop();
            self.carry_cr = true;
        }
        normalize_line_endings(&text)
    }

    fn truncate_to_window(&mut self) {
        let len = self.pending.chars().count();
        if len <= self.tail_window {
            return;
        }
        let cut = self
            .pending
            .char_indices()
            .nth(len - self.tail_window)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        self.pending.drain(..cut);
    }

    fn strip_preamble(&mut self, at_end: bool) {
        strip_leading(&mut self.pending, &MARKER_LINE_END, at_end);
        strip_leading(&mut self.pending, &LEADING_GUIDANCE, at_end);
        while strip_leading(&mut self.pending, &LEADING_TIMESTAMP, at_end) {}
        strip_leading(&mut self.pending, &LEADING_PRODUCT, at_end);
    }

    fn take_ready(&mut self) -> String {
        let line_start = match self.pending.rfind('\n') {
            Some(idx) => idx + 1,
            None if self.line_open => self.pending.len(),
            None => 0,
        };
        let cut = if may_become_noise(&self.pending[line_start..]) {
            line_start
        } else {
            self.pending.len()
        };
        let rest = self.pending.split_off(cut);
        let ready = std::mem::replace(&mut self.pending, rest);
        if !ready.is_empty() {
            self.line_open = !ready.ends_with('\n');
        }
        ready
    }
}

/// The preamble can be judged once a complete non-blank line arrived, or once
/// the first content cannot grow into a preamble line.
fn preamble_settled(text: &str) -> bool {
    let complete_content = text
        .split_inclusive('\n')
        .any(|line| line.ends_with('\n') && !line.trim().is_empty());
    if complete_content {
        return true;
    }
    let partial = text.rsplit('\n').next().unwrap_or_default();
    !may_become_noise(partial)
}

/// Removes one leading match, never consuming a line that may still grow.
fn strip_leading(text: &mut String, pattern: &Regex, at_end: bool) -> bool {
    let Some(found) = pattern.find(text) else {
        return false;
    };
    let end = found.end();
    if end == 0 || (!at_end && !text[..end].ends_with('\n')) {
        return false;
    }
    text.drain(..end);
    true
}

/// Post-boundary part of a complete output, if it contains the boundary.
pub fn post_boundary_text(full_output: &str) -> Option<String> {
    let mut reassembler = StreamReassembler::new();
    let mut out = reassembler.push(full_output);
    out.push_str(&reassembler.finish());
    reassembler.boundary_found().then_some(out)
}
