//! Drives transform runs end to end.
//!
//! The controller owns a map from [`RunId`] to its [`RunSession`]. Process
//! events are routed by looking the run up; once a run reaches a terminal
//! state its session is removed, so late or duplicate events find nothing to
//! act on.

use super::inserter::lock_buffer;
use super::prompt::build_prompt;
use super::session::{RunSession, RunState, SessionOptions};
use super::status::{Notice, StatusSink};
use crate::buffer::{Selection, SharedBuffer};
use crate::error::TransformError;
use crate::process::ProcessService;
use crate::types::{
    CompletionPayload, EffortLevel, InvokeRequest, ProcessEvent, RunId, StreamPayload,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATUS_MESSAGE: &str = "Transforming… (cancel to stop)";

/// What the instruction dialog hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformInstruction {
    pub instruction: String,
    pub effort: Option<EffortLevel>,
}

impl TransformInstruction {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            effort: None,
        }
    }

    pub fn with_effort(mut self, effort: EffortLevel) -> Self {
        self.effort = Some(effort);
        self
    }
}

/// A transform waiting for its instruction.
pub struct PendingTransform {
    buffer: SharedBuffer,
    selection: Selection,
    selection_text: String,
    cwd: Option<PathBuf>,
}

impl PendingTransform {
    pub fn state(&self) -> RunState {
        RunState::AwaitingInstruction
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn selection_text(&self) -> &str {
        &self.selection_text
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

/// Outcome of a run that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    pub state: RunState,
    pub final_text: Option<String>,
    pub error: Option<String>,
}

impl RunReport {
    fn completed(run_id: RunId, final_text: String) -> Self {
        Self {
            run_id,
            state: RunState::Completed,
            final_text: Some(final_text),
            error: None,
        }
    }

    fn failed(run_id: RunId, error: impl Into<String>) -> Self {
        Self {
            run_id,
            state: RunState::Failed,
            final_text: None,
            error: Some(error.into()),
        }
    }

    fn cancelled(run_id: RunId) -> Self {
        Self {
            run_id,
            state: RunState::Cancelled,
            final_text: None,
            error: None,
        }
    }
}

pub struct TransformController {
    process: Arc<dyn ProcessService>,
    status: Arc<dyn StatusSink>,
    options: SessionOptions,
    sessions: HashMap<RunId, RunSession>,
}

impl TransformController {
    pub fn new(
        process: Arc<dyn ProcessService>,
        status: Arc<dyn StatusSink>,
        options: SessionOptions,
    ) -> Self {
        Self {
            process,
            status,
            options,
            sessions: HashMap::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Captures the selection and working directory before the instruction
    /// dialog opens.
    pub fn prepare(
        &self,
        buffer: SharedBuffer,
        file_path: Option<&Path>,
    ) -> Result<PendingTransform, TransformError> {
        let (selection, selection_text) = {
            let guard = lock_buffer(&buffer)?;
            let selection = guard.selection();
            let text: String = guard
                .text()
                .chars()
                .skip(selection.start())
                .take(selection.end() - selection.start())
                .collect();
            (selection, text)
        };
        let cwd = file_path
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);
        Ok(PendingTransform {
            buffer,
            selection,
            selection_text,
            cwd,
        })
    }

    /// Launches the external tool. On launch failure the run never exists:
    /// the indicator is removed and an install hint is shown.
    pub async fn start(
        &mut self,
        pending: PendingTransform,
        instruction: TransformInstruction,
    ) -> Result<RunId, TransformError> {
        let run_id = self.fresh_run_id();
        let prompt = build_prompt(&instruction.instruction, &pending.selection_text);
        let session = RunSession::new(
            run_id.clone(),
            prompt.clone(),
            pending.buffer,
            pending.selection,
            &self.options,
        )?;
        self.sessions.insert(run_id.clone(), session);
        self.status.show(&run_id, STATUS_MESSAGE);

        let mut config = BTreeMap::new();
        if let Some(effort) = instruction.effort {
            config.insert(
                EffortLevel::CONFIG_KEY.to_string(),
                effort.as_str().to_string(),
            );
        }
        let request = InvokeRequest {
            prompt,
            cwd: pending.cwd,
            run_id: run_id.clone(),
            model: self.options.model.clone(),
            config,
        };

        info!(
            run_id = %run_id,
            has_selection = !pending.selection.is_empty(),
            "starting transform"
        );
        if let Err(err) = self.process.invoke_streaming(request).await {
            warn!(run_id = %run_id, error = %err, "failed to launch transform");
            self.sessions.remove(&run_id);
            self.status.dismiss(&run_id);
            self.status.notify(Notice::error(format!(
                "Could not run {}: {err}. Install it and make sure it is on your PATH.",
                self.process.tool_name()
            )));
            return Err(err);
        }
        Ok(run_id)
    }

    /// Routes one process event. Returns a report when the event ended a run.
    pub async fn dispatch(&mut self, event: ProcessEvent) -> Option<RunReport> {
        match event {
            ProcessEvent::Stream(payload) => self.on_stream(payload).await,
            ProcessEvent::Complete(payload) => self.on_complete(payload),
        }
    }

    /// Stops a running transform. Text already inserted stays in the buffer.
    pub async fn cancel(&mut self, run_id: &RunId) -> Result<RunReport, TransformError> {
        if self.sessions.remove(run_id).is_none() {
            return Err(TransformError::NotRunning(run_id.clone()));
        }
        self.status.dismiss(run_id);
        info!(run_id = %run_id, "transform cancelled");
        if let Err(err) = self.process.cancel(run_id).await {
            warn!(run_id = %run_id, error = %err, "failed to stop transform process");
        }
        Ok(RunReport::cancelled(run_id.clone()))
    }

    pub fn is_running(&self, run_id: &RunId) -> bool {
        self.sessions.contains_key(run_id)
    }

    /// `Running` while the run is in flight, `Idle` otherwise. Terminal
    /// states are reported once through [`RunReport`].
    pub fn state(&self, run_id: &RunId) -> RunState {
        if self.sessions.contains_key(run_id) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn active_runs(&self) -> Vec<RunId> {
        let mut runs: Vec<RunId> = self.sessions.keys().cloned().collect();
        runs.sort();
        runs
    }

    pub fn session(&self, run_id: &RunId) -> Option<&RunSession> {
        self.sessions.get(run_id)
    }

    async fn on_stream(&mut self, payload: StreamPayload) -> Option<RunReport> {
        let Some(session) = self.sessions.get_mut(&payload.run_id) else {
            debug!(run_id = %payload.run_id, "ignoring output for inactive run");
            return None;
        };
        let err = session.on_stream(&payload).err()?;

        let run_id = payload.run_id;
        warn!(run_id = %run_id, error = %err, "transform aborted while streaming");
        self.sessions.remove(&run_id);
        self.status.dismiss(&run_id);
        self.status
            .notify(Notice::error(format!("Transform failed: {err}")));
        if let Err(cancel_err) = self.process.cancel(&run_id).await {
            debug!(run_id = %run_id, error = %cancel_err, "process already gone");
        }
        Some(RunReport::failed(run_id, err.to_string()))
    }

    fn on_complete(&mut self, payload: CompletionPayload) -> Option<RunReport> {
        let Some(session) = self.sessions.remove(&payload.run_id) else {
            debug!(run_id = %payload.run_id, "ignoring completion for inactive run");
            return None;
        };
        self.status.dismiss(&payload.run_id);
        let run_id = payload.run_id;

        if !payload.ok {
            let error = payload
                .error
                .unwrap_or_else(|| "transform process failed".to_string());
            warn!(run_id = %run_id, error = %error, "transform failed");
            if let Err(err) = session.fail() {
                warn!(run_id = %run_id, error = %err, "failed to flush partial output");
            }
            self.status
                .notify(Notice::error(format!("Transform failed: {error}")));
            return Some(RunReport::failed(run_id, error));
        }

        let output = payload.output.unwrap_or_default();
        match session.complete(&output) {
            Ok(final_text) => {
                info!(
                    run_id = %run_id,
                    chars = final_text.chars().count(),
                    "transform completed"
                );
                Some(RunReport::completed(run_id, final_text))
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "failed to apply transform output");
                self.status
                    .notify(Notice::error(format!("Transform failed: {err}")));
                Some(RunReport::failed(run_id, err.to_string()))
            }
        }
    }

    fn fresh_run_id(&self) -> RunId {
        loop {
            let run_id = RunId::generate();
            if !self.sessions.contains_key(&run_id) {
                return run_id;
            }
        }
    }
}
