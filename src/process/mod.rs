//! Process-invocation services: launch an external transform tool for a run
//! and report its output as [`ProcessEvent`]s.
//!
//! [`ProcessEvent`]: crate::types::ProcessEvent

mod cli;
mod resolve;
mod scripted;

pub use cli::CliProcessService;
pub use resolve::{candidate_paths, resolve_binary_path, APP_DIR_NAME};
pub use scripted::{Script, ScriptedProcessService};

use crate::error::TransformError;
use crate::types::{InvokeRequest, RunId};
use async_trait::async_trait;

#[async_trait]
pub trait ProcessService: Send + Sync {
    /// Human-facing name of the tool, used in install hints.
    fn tool_name(&self) -> &str;

    /// Resolves once the process has launched; output and completion arrive
    /// later as events tagged with `request.run_id`.
    async fn invoke_streaming(&self, request: InvokeRequest) -> Result<(), TransformError>;

    async fn cancel(&self, run_id: &RunId) -> Result<(), TransformError>;
}
