use super::ProcessService;
use crate::error::TransformError;
use crate::types::{CompletionPayload, InvokeRequest, ProcessEvent, RunId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
enum Step {
    Stdout(String),
    Stderr(String),
    Complete { ok: bool, text: String },
}

/// What one invocation does: a list of events to replay, or a launch failure.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<Step>,
    launch_error: Option<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, data: impl Into<String>) -> Self {
        self.steps.push(Step::Stdout(data.into()));
        self
    }

    pub fn stderr(mut self, data: impl Into<String>) -> Self {
        self.steps.push(Step::Stderr(data.into()));
        self
    }

    pub fn succeed(mut self, output: impl Into<String>) -> Self {
        self.steps.push(Step::Complete {
            ok: true,
            text: output.into(),
        });
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.steps.push(Step::Complete {
            ok: false,
            text: error.into(),
        });
        self
    }

    /// No further events; the run stays open until cancelled.
    pub fn hang(self) -> Self {
        self
    }

    pub fn launch_failure(mut self, message: impl Into<String>) -> Self {
        self.launch_error = Some(message.into());
        self
    }

    fn events(&self, run_id: &RunId) -> Vec<ProcessEvent> {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Stdout(data) => ProcessEvent::stdout(run_id, data.clone()),
                Step::Stderr(data) => ProcessEvent::stderr(run_id, data.clone()),
                Step::Complete { ok: true, text } => {
                    ProcessEvent::Complete(CompletionPayload::success(run_id.clone(), text.clone()))
                }
                Step::Complete { ok: false, text } => {
                    ProcessEvent::Complete(CompletionPayload::failure(run_id.clone(), text.clone()))
                }
            })
            .collect()
    }
}

/// In-process stand-in for a command-line tool. Each invocation takes the
/// next script and replays it onto the event channel, tagged with the run id
/// it was given.
#[derive(Clone)]
pub struct ScriptedProcessService {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    invocations: Arc<Mutex<Vec<InvokeRequest>>>,
    cancellations: Arc<Mutex<Vec<RunId>>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl ScriptedProcessService {
    pub fn new(events: mpsc::UnboundedSender<ProcessEvent>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            invocations: Arc::new(Mutex::new(Vec::new())),
            cancellations: Arc::new(Mutex::new(Vec::new())),
            events,
        }
    }

    pub fn with_scripts(
        events: mpsc::UnboundedSender<ProcessEvent>,
        scripts: impl IntoIterator<Item = Script>,
    ) -> Self {
        let service = Self::new(events);
        for script in scripts {
            service.push_script(script);
        }
        service
    }

    pub fn push_script(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    pub fn invocations(&self) -> Vec<InvokeRequest> {
        lock(&self.invocations).clone()
    }

    pub fn cancellations(&self) -> Vec<RunId> {
        lock(&self.cancellations).clone()
    }

    /// Sends an arbitrary event, e.g. a late or duplicate delivery.
    pub fn inject(&self, event: ProcessEvent) {
        let _ = self.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProcessService for ScriptedProcessService {
    fn tool_name(&self) -> &str {
        "scripted"
    }

    async fn invoke_streaming(&self, request: InvokeRequest) -> Result<(), TransformError> {
        let script = lock(&self.scripts).pop_front();
        let Some(script) = script else {
            return Err(TransformError::Launch {
                binary: PathBuf::from("scripted"),
                source: io::Error::new(io::ErrorKind::NotFound, "no more scripts configured"),
            });
        };
        if let Some(message) = script.launch_error {
            return Err(TransformError::Launch {
                binary: PathBuf::from("scripted"),
                source: io::Error::new(io::ErrorKind::NotFound, message),
            });
        }

        let events = script.events(&request.run_id);
        lock(&self.invocations).push(request);
        for event in events {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    async fn cancel(&self, run_id: &RunId) -> Result<(), TransformError> {
        lock(&self.cancellations).push(run_id.clone());
        Ok(())
    }
}
