use super::resolve::resolve_binary_path;
use super::ProcessService;
use crate::error::TransformError;
use crate::transform::sanitize::strip_ansi;
use crate::types::{
    CompletionPayload, InvokeRequest, ProcessEvent, Provider, RunId, StreamChannel, StreamPayload,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type RunningMap = Arc<Mutex<HashMap<RunId, CancellationToken>>>;

/// Runs the provider's command-line tool, one child process per run.
#[derive(Clone)]
pub struct CliProcessService {
    provider: Provider,
    binary: Option<PathBuf>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    running: RunningMap,
}

impl CliProcessService {
    pub fn new(provider: Provider, events: mpsc::UnboundedSender<ProcessEvent>) -> Self {
        Self {
            provider,
            binary: None,
            events,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Skips path resolution and always launches `binary`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn running_count(&self) -> usize {
        self.lock_running().len()
    }

    /// Arguments passed to the tool, prompt last.
    pub fn command_args(&self, request: &InvokeRequest) -> Vec<String> {
        let mut args = match self.provider {
            Provider::Codex => vec!["exec".to_string(), "--skip-git-repo-check".to_string()],
            Provider::Claude => vec!["--print".to_string()],
        };
        if let Some(model) = request.model.as_ref().filter(|m| !m.trim().is_empty()) {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.provider.accepts_config_pairs() {
            for (key, value) in &request.config {
                args.push("-c".to_string());
                args.push(format!("{key}={value}"));
            }
        }
        args.push(request.prompt.clone());
        args
    }

    fn binary_path(&self) -> Result<PathBuf, TransformError> {
        match &self.binary {
            Some(binary) => Ok(binary.clone()),
            None => resolve_binary_path(self.provider.binary_name()),
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<RunId, CancellationToken>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcessService for CliProcessService {
    fn tool_name(&self) -> &str {
        self.provider.binary_name()
    }

    async fn invoke_streaming(&self, request: InvokeRequest) -> Result<(), TransformError> {
        let binary = self.binary_path()?;
        let mut command = Command::new(&binary);
        command
            .args(self.command_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = request.cwd.as_ref().filter(|dir| dir.is_dir()) {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| TransformError::Launch {
            binary: binary.clone(),
            source,
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout pipe was not available"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr pipe was not available"))?;

        let run_id = request.run_id;
        let token = CancellationToken::new();
        self.lock_running().insert(run_id.clone(), token.clone());
        info!(run_id = %run_id, binary = %binary.display(), pid = ?child.id(), "launched transform process");

        tokio::spawn(supervise(
            child,
            stdout,
            stderr,
            Worker {
                run_id,
                token,
                events: self.events.clone(),
                running: Arc::clone(&self.running),
            },
        ));
        Ok(())
    }

    async fn cancel(&self, run_id: &RunId) -> Result<(), TransformError> {
        let token = self
            .lock_running()
            .remove(run_id)
            .ok_or_else(|| TransformError::ProcessNotFound(run_id.clone()))?;
        token.cancel();
        Ok(())
    }
}

struct Worker {
    run_id: RunId,
    token: CancellationToken,
    events: mpsc::UnboundedSender<ProcessEvent>,
    running: RunningMap,
}

impl Worker {
    fn release(&self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.run_id);
        }
    }

    fn emit(&self, event: ProcessEvent) {
        if self.events.send(event).is_err() {
            debug!(run_id = %self.run_id, "event receiver dropped");
        }
    }
}

async fn supervise<O, E>(mut child: Child, stdout: O, stderr: E, worker: Worker)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let transcript = Mutex::new(String::new());
    let finished = tokio::select! {
        _ = worker.token.cancelled() => None,
        status = async {
            futures::future::join(
                pump(stdout, StreamChannel::Stdout, &worker, &transcript),
                pump(stderr, StreamChannel::Stderr, &worker, &transcript),
            )
            .await;
            child.wait().await
        } => Some(status),
    };

    let Some(status) = finished else {
        if let Err(err) = child.kill().await {
            warn!(run_id = %worker.run_id, error = %err, "failed to kill cancelled process");
        }
        info!(run_id = %worker.run_id, "transform process killed");
        return;
    };

    worker.release();
    let text = transcript
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let completion = completion_for(&worker.run_id, status, text);
    info!(run_id = %worker.run_id, ok = completion.ok, "transform process exited");
    worker.emit(ProcessEvent::Complete(completion));
}

async fn pump<R>(reader: R, channel: StreamChannel, worker: &Worker, transcript: &Mutex<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(run_id = %worker.run_id, ?channel, error = %err, "stopped reading process output");
                break;
            }
        }
        // Invalid UTF-8 is replaced, never a reason to stop reading.
        let decoded = String::from_utf8_lossy(&raw);
        let line = decoded.as_ref();
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let data = format!("{}\n", strip_ansi(line));
        if let Ok(mut transcript) = transcript.lock() {
            transcript.push_str(&data);
        }
        worker.emit(ProcessEvent::Stream(StreamPayload {
            run_id: worker.run_id.clone(),
            channel,
            data,
        }));
    }
}

fn completion_for(
    run_id: &RunId,
    status: io::Result<ExitStatus>,
    text: String,
) -> CompletionPayload {
    match status {
        Ok(status) if status.success() => CompletionPayload::success(run_id.clone(), text),
        Ok(status) if text.trim().is_empty() => {
            CompletionPayload::failure(run_id.clone(), format!("process exited with {status}"))
        }
        Ok(_) => CompletionPayload::failure(run_id.clone(), text),
        Err(err) => CompletionPayload::failure(run_id.clone(), err.to_string()),
    }
}
