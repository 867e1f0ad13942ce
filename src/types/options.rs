use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reasoning-effort hint forwarded to the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl EffortLevel {
    pub const CONFIG_KEY: &'static str = "model_reasoning_effort";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffortLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "unknown effort level '{other}', expected minimal/low/medium/high"
            )),
        }
    }
}

/// External command-line tool that performs the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Codex,
    Claude,
}

impl Provider {
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
        }
    }

    /// Whether `key=value` config pairs can be forwarded on the command line.
    pub fn accepts_config_pairs(self) -> bool {
        matches!(self, Self::Codex)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            other => Err(format!("unknown provider '{other}', expected codex or claude")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effort_level_parse_is_case_insensitive() {
        assert_eq!("HIGH".parse::<EffortLevel>(), Ok(EffortLevel::High));
        assert_eq!(" low ".parse::<EffortLevel>(), Ok(EffortLevel::Low));
        assert!("extreme".parse::<EffortLevel>().is_err());
    }

    #[test]
    fn test_provider_binary_names() {
        assert_eq!(Provider::default().binary_name(), "codex");
        assert_eq!("claude".parse::<Provider>(), Ok(Provider::Claude));
        assert!(!Provider::Claude.accepts_config_pairs());
    }
}
