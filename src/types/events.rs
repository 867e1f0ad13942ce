use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque token correlating process output with the run that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Millisecond timestamp plus a random suffix.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let suffix: u32 = rand::random();
        Self(format!("run-{millis}-{suffix:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamChannel {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPayload {
    pub run_id: RunId,
    pub channel: StreamChannel,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub run_id: RunId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionPayload {
    pub fn success(run_id: RunId, output: impl Into<String>) -> Self {
        Self {
            run_id,
            ok: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(run_id: RunId, error: impl Into<String>) -> Self {
        Self {
            run_id,
            ok: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Everything a process-invocation service can deliver for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessEvent {
    Stream(StreamPayload),
    Complete(CompletionPayload),
}

impl ProcessEvent {
    pub fn stdout(run_id: &RunId, data: impl Into<String>) -> Self {
        Self::Stream(StreamPayload {
            run_id: run_id.clone(),
            channel: StreamChannel::Stdout,
            data: data.into(),
        })
    }

    pub fn stderr(run_id: &RunId, data: impl Into<String>) -> Self {
        Self::Stream(StreamPayload {
            run_id: run_id.clone(),
            channel: StreamChannel::Stderr,
            data: data.into(),
        })
    }

    pub fn run_id(&self) -> &RunId {
        match self {
            Self::Stream(payload) => &payload.run_id,
            Self::Complete(payload) => &payload.run_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub prompt: String,
    pub cwd: Option<PathBuf>,
    pub run_id: RunId,
    pub model: Option<String>,
    pub config: BTreeMap<String, String>,
}
