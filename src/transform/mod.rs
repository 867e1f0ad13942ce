//! The streaming transform pipeline: raw process chunks are reassembled,
//! sanitized and inserted into a text buffer by one [`RunSession`] per run,
//! with the [`TransformController`] routing events between them.

pub mod controller;
pub mod inserter;
pub mod prompt;
pub mod reassembler;
pub mod sanitize;
pub mod segment;
pub mod session;
pub mod status;

pub use controller::{PendingTransform, RunReport, TransformController, TransformInstruction};
pub use inserter::{IncrementalInserter, InsertMode};
pub use prompt::build_prompt;
pub use reassembler::{post_boundary_text, StreamReassembler};
pub use sanitize::{sanitize, SanitizationRule, StreamSanitizer};
pub use segment::segment;
pub use session::{RunSession, RunState, SessionOptions};
pub use status::{LogStatus, Notice, NoticeLevel, RecordingStatus, StatusEvent, StatusSink};
