//! Status indicator and notification surface for transform runs.

use crate::types::RunId;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Where the controller reports progress. One indicator per run.
pub trait StatusSink: Send + Sync {
    fn show(&self, run_id: &RunId, message: &str);

    fn dismiss(&self, run_id: &RunId);

    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Shown { run_id: RunId, message: String },
    Dismissed { run_id: RunId },
    Notified(Notice),
}

/// Keeps every status call in order; used by tests and headless embedders.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatus {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                StatusEvent::Notified(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Runs whose indicator is currently shown.
    pub fn visible(&self) -> Vec<RunId> {
        let mut visible: Vec<RunId> = Vec::new();
        for event in self.lock().iter() {
            match event {
                StatusEvent::Shown { run_id, .. } => {
                    if !visible.contains(run_id) {
                        visible.push(run_id.clone());
                    }
                }
                StatusEvent::Dismissed { run_id } => visible.retain(|id| id != run_id),
                StatusEvent::Notified(_) => {}
            }
        }
        visible
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StatusEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: StatusEvent) {
        self.lock().push(event);
    }
}

impl StatusSink for RecordingStatus {
    fn show(&self, run_id: &RunId, message: &str) {
        self.record(StatusEvent::Shown {
            run_id: run_id.clone(),
            message: message.to_string(),
        });
    }

    fn dismiss(&self, run_id: &RunId) {
        self.record(StatusEvent::Dismissed {
            run_id: run_id.clone(),
        });
    }

    fn notify(&self, notice: Notice) {
        self.record(StatusEvent::Notified(notice));
    }
}

/// Writes status to stderr and the tracing log; used by the `edx` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn show(&self, run_id: &RunId, message: &str) {
        tracing::info!(run_id = %run_id, "{message}");
        eprintln!("{message}");
    }

    fn dismiss(&self, run_id: &RunId) {
        tracing::debug!(run_id = %run_id, "status dismissed");
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => tracing::info!("{}", notice.message),
            NoticeLevel::Error => tracing::error!("{}", notice.message),
        }
        eprintln!("{}", notice.message);
    }
}
