use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use editrion::buffer::{Document, TextBuffer};
use editrion::config::TransformConfig;
use editrion::logging;
use editrion::process::CliProcessService;
use editrion::transform::{
    LogStatus, RunState, SessionOptions, TransformController, TransformInstruction,
};
use editrion::types::{EffortLevel, Provider};
use editrion::util::parse_offset_range;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

/// Run an AI transform over a file, streaming the result into it.
#[derive(Debug, Parser)]
#[command(name = "edx", version)]
struct Args {
    /// File to transform.
    #[arg(long)]
    file: PathBuf,

    /// What to do with the text, e.g. "Uppercase".
    #[arg(long, short)]
    instruction: String,

    /// Replace the char range START..END.
    #[arg(long, value_parser = parse_range, conflicts_with = "caret")]
    select: Option<(usize, usize)>,

    /// Insert at this char offset instead of the end of the file.
    #[arg(long)]
    caret: Option<usize>,

    #[arg(long)]
    effort: Option<EffortLevel>,

    #[arg(long)]
    provider: Option<Provider>,

    #[arg(long)]
    model: Option<String>,

    /// Rewrite the file instead of printing the result.
    #[arg(long)]
    write: bool,
}

fn parse_range(value: &str) -> Result<(usize, usize), String> {
    parse_offset_range(value).ok_or_else(|| format!("expected START..END, got '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("info");

    let mut config = TransformConfig::load()?;
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(model) = &args.model {
        config.model = Some(model.clone());
    }
    config.validate()?;

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let mut document = Document::new(text);
    match (args.select, args.caret) {
        (Some((start, end)), _) => document.select(start, end),
        (None, Some(caret)) => document.move_caret(caret),
        (None, None) => document.move_caret(document.len_chars()),
    }
    let document = Arc::new(Mutex::new(document));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let process = CliProcessService::new(config.provider, events_tx);
    let mut controller = TransformController::new(
        Arc::new(process),
        Arc::new(LogStatus),
        SessionOptions::from(&config),
    );

    let pending = controller.prepare(document.clone(), Some(&args.file))?;
    let mut instruction = TransformInstruction::new(args.instruction.clone());
    if let Some(effort) = args.effort.or(config.default_effort) {
        instruction = instruction.with_effort(effort);
    }
    let run_id = controller.start(pending, instruction).await?;

    let report = loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else {
                    bail!("process service stopped before run {run_id} finished");
                };
                if let Some(report) = controller.dispatch(event).await {
                    break report;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break controller.cancel(&run_id).await?;
            }
        }
    };

    match report.state {
        RunState::Completed => info!(run_id = %run_id, "transform applied"),
        RunState::Cancelled => info!(run_id = %run_id, "transform cancelled, keeping partial output"),
        _ => bail!(
            "transform failed: {}",
            report.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }

    let result = document
        .lock()
        .map_err(|_| anyhow!("document lock poisoned"))?
        .as_str()
        .to_string();
    if args.write {
        std::fs::write(&args.file, &result)
            .with_context(|| format!("failed to write {}", args.file.display()))?;
    } else {
        print!("{result}");
    }
    Ok(())
}
