use crate::types::{RunId, StreamChannel};
use crate::util::parse_bool_str;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_PATH: &str = "/tmp/editrion-transform.log";
const LOG_FILTER_ENV: &str = "EDITRION_LOG";
const LOG_PATH_ENV: &str = "EDITRION_LOG_PATH";
const DEBUG_STREAM_ENV: &str = "EDITRION_DEBUG_STREAM";

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = || {
        std::env::var(LOG_FILTER_ENV)
            .ok()
            .and_then(|value| EnvFilter::try_new(value).ok())
            .unwrap_or_else(|| EnvFilter::new(default_filter))
    };

    if let Some(path) = resolve_log_path() {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => eprintln!("editrion: cannot open log file {path}: {err}"),
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn debug_stream_enabled() -> bool {
    std::env::var(DEBUG_STREAM_ENV)
        .ok()
        .and_then(|value| parse_bool_str(&value))
        .unwrap_or(false)
}

/// Logs a raw process chunk before it is reassembled.
pub fn trace_stream_chunk(run_id: &RunId, channel: StreamChannel, data: &str) {
    if debug_stream_enabled() {
        tracing::debug!(run_id = %run_id, ?channel, data = ?data, "raw stream chunk");
    }
}

fn resolve_log_path() -> Option<String> {
    crate::util::non_empty_env(LOG_PATH_ENV).or_else(|| {
        if std::io::stderr().is_terminal() {
            Some(DEFAULT_LOG_PATH.to_string())
        } else {
            None
        }
    })
}
