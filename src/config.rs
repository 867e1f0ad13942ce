use anyhow::{bail, Context, Result};
use std::str::FromStr;

use crate::transform::reassembler::DEFAULT_TAIL_WINDOW;
use crate::transform::segment::DEFAULT_SEGMENT_SIZE;
use crate::types::{EffortLevel, Provider};
use crate::util::non_empty_env;

/// The boundary marker has to fit inside the retained tail.
const MIN_TAIL_WINDOW: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    pub provider: Provider,
    pub model: Option<String>,
    pub default_effort: Option<EffortLevel>,
    pub segment_size: usize,
    pub tail_window: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            default_effort: None,
            segment_size: DEFAULT_SEGMENT_SIZE,
            tail_window: DEFAULT_TAIL_WINDOW,
        }
    }
}

impl TransformConfig {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let provider = match non_empty_env("EDITRION_PROVIDER") {
            Some(value) => Provider::from_str(&value)
                .map_err(anyhow::Error::msg)
                .context("invalid EDITRION_PROVIDER")?,
            None => defaults.provider,
        };
        let default_effort = non_empty_env("EDITRION_EFFORT")
            .map(|value| {
                EffortLevel::from_str(&value)
                    .map_err(anyhow::Error::msg)
                    .context("invalid EDITRION_EFFORT")
            })
            .transpose()?;
        let segment_size = parse_usize_env("EDITRION_SEGMENT_SIZE")?.unwrap_or(defaults.segment_size);
        let tail_window = parse_usize_env("EDITRION_TAIL_WINDOW")?.unwrap_or(defaults.tail_window);
        // Unlike the other variables a blank model is kept so validate can reject it.
        let model = std::env::var("EDITRION_MODEL").ok();

        Ok(Self {
            provider,
            model,
            default_effort,
            segment_size,
            tail_window,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.segment_size == 0 {
            bail!("EDITRION_SEGMENT_SIZE must be at least 1");
        }
        if self.tail_window < MIN_TAIL_WINDOW {
            bail!(
                "EDITRION_TAIL_WINDOW must be at least {MIN_TAIL_WINDOW} characters (got {})",
                self.tail_window
            );
        }
        if self
            .model
            .as_ref()
            .is_some_and(|model| model.trim().is_empty())
        {
            bail!("EDITRION_MODEL is set but empty");
        }
        Ok(())
    }
}

fn parse_usize_env(name: &str) -> Result<Option<usize>> {
    non_empty_env(name)
        .map(|value| {
            value
                .parse::<usize>()
                .with_context(|| format!("{name} must be a non-negative integer, got '{value}'"))
        })
        .transpose()
}
