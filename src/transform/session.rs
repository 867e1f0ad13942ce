use super::inserter::IncrementalInserter;
use super::reassembler::{StreamReassembler, DEFAULT_TAIL_WINDOW};
use super::sanitize::StreamSanitizer;
use super::segment::DEFAULT_SEGMENT_SIZE;
use crate::buffer::{Selection, SharedBuffer};
use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::types::{RunId, StreamChannel, StreamPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    AwaitingInstruction,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Per-session tuning handed to every run at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub segment_size: usize,
    pub tail_window: usize,
    pub model: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            tail_window: DEFAULT_TAIL_WINDOW,
            model: None,
        }
    }
}

impl From<&TransformConfig> for SessionOptions {
    fn from(config: &TransformConfig) -> Self {
        Self {
            segment_size: config.segment_size,
            tail_window: config.tail_window,
            model: config.model.clone(),
        }
    }
}

/// One running transform. Owned by the controller until it reaches a
/// terminal state, at which point it is dropped and can no longer touch the
/// buffer.
pub struct RunSession {
    run_id: RunId,
    prompt: String,
    reassembler: StreamReassembler,
    sanitizer: StreamSanitizer,
    inserter: IncrementalInserter,
}

impl RunSession {
    pub fn new(
        run_id: RunId,
        prompt: String,
        buffer: SharedBuffer,
        selection: Selection,
        options: &SessionOptions,
    ) -> Result<Self, TransformError> {
        Ok(Self {
            run_id,
            prompt,
            reassembler: StreamReassembler::with_tail_window(options.tail_window),
            sanitizer: StreamSanitizer::new(),
            inserter: IncrementalInserter::new(buffer, selection, options.segment_size)?,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn has_selection(&self) -> bool {
        self.inserter.has_selection()
    }

    pub fn boundary_found(&self) -> bool {
        self.reassembler.boundary_found()
    }

    pub fn insert_offset(&self) -> usize {
        self.inserter.insert_offset()
    }

    pub fn streamed_output(&self) -> &str {
        self.inserter.output()
    }

    /// Feeds one streaming event. Stderr output never reaches the buffer.
    pub fn on_stream(&mut self, payload: &StreamPayload) -> Result<(), TransformError> {
        crate::logging::trace_stream_chunk(&self.run_id, payload.channel, &payload.data);
        if payload.channel != StreamChannel::Stdout {
            return Ok(());
        }
        let ready = self.reassembler.push(&payload.data);
        self.feed(&ready)
    }

    /// Finalizes a successful run and returns the text it left in the buffer.
    pub fn complete(mut self, full_output: &str) -> Result<String, TransformError> {
        let rest = self.reassembler.finish();
        self.feed(&rest)?;
        self.inserter.finish(full_output)
    }

    /// Ends a failed run. Text held back while streaming is still inserted;
    /// nothing else touches the buffer.
    pub fn fail(mut self) -> Result<(), TransformError> {
        let rest = self.reassembler.finish();
        self.feed(&rest)
    }

    fn feed(&mut self, ready: &str) -> Result<(), TransformError> {
        if ready.is_empty() {
            return Ok(());
        }
        let clean = self.sanitizer.sanitize(ready);
        self.inserter.on_sanitized_slice(&clean)
    }
}
