use std::path::PathBuf;

use crate::types::RunId;

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("position {line}:{column} does not exist in the buffer")]
    PositionOutOfBounds { line: usize, column: usize },

    #[error("edit ranges overlap")]
    OverlappingEdits,
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to launch {}: {source}", binary.display())]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve path for binary: {0}")]
    BinaryNotFound(String),

    #[error("process not found for run_id: {0}")]
    ProcessNotFound(RunId),

    #[error("run {0} is not running")]
    NotRunning(RunId),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("text buffer lock poisoned")]
    BufferPoisoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransformError {
    /// Launch-class failures mean the external tool is missing or not executable.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. } | Self::BinaryNotFound(_))
    }
}
