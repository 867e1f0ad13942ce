//! Line-level filtering of protocol noise from external tool output.

use regex::Regex;
use std::sync::LazyLock;

/// A named predicate deciding whether a single line is noise.
pub struct SanitizationRule {
    pub name: &'static str,
    pattern: Regex,
}

impl SanitizationRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("invalid sanitization rule"),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

static RULES: LazyLock<Vec<SanitizationRule>> = LazyLock::new(|| {
    vec![
        SanitizationRule::new("code_fence", r"^\s*```"),
        SanitizationRule::new("separator", r"^\s*(?:-{3,}|={3,}|_{3,})\s*$"),
        SanitizationRule::new("input_start", r"(?i)^\s*-{3}\s*input\s+start\s*-{3}\s*$"),
        SanitizationRule::new("input_end", r"(?i)^\s*-{3}\s*input\s+end\s*-{3}\s*$"),
        SanitizationRule::new(
            "guidance",
            r"(?i)^\s*return\s+only\s+the\s+transformed\s+text\.?\s*$",
        ),
        SanitizationRule::new("instructions_label", r"(?i)^\s*user\s+instructions:"),
        SanitizationRule::new(
            "metadata",
            r"(?i)^\s*(?:[-=_*>|]+\s*)?(?:workdir|provider|approval|sandbox|reasoning(?:\s+effort|\s+summaries)?|usage|model|tokens(?:\s+used)?|run[-_ ]?id|session\s+id)\s*[:=]",
        ),
        SanitizationRule::new("timestamp", r"^\s*\[\d{4}-\d{2}-\d{2}[^\]]*\]"),
        SanitizationRule::new("product_name", r"(?i)^\s*codex\s*$"),
        SanitizationRule::new("banner", r"(?i)^\s*openai\s+codex\s+v\d"),
    ]
});

pub fn rules() -> &'static [SanitizationRule] {
    &RULES
}

/// Name of the first rule that classifies `line` as noise.
pub fn matching_rule(line: &str) -> Option<&'static str> {
    RULES
        .iter()
        .find(|rule| rule.matches(line))
        .map(|rule| rule.name)
}

pub fn is_noise_line(line: &str) -> bool {
    matching_rule(line).is_some()
}

/// Turns `\r\n` and lone `\r` into `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Removes terminal escape sequences (CSI, OSC, DCS and friends).
pub fn strip_ansi(text: &str) -> String {
    // Tabs are content; keep them out of the stripper's control-byte handling.
    text.split('\t')
        .map(|piece| String::from_utf8_lossy(&strip_ansi_escapes::strip(piece)).into_owned())
        .collect::<Vec<_>>()
        .join("\t")
}

/// Drops whole noise lines and keeps every other line verbatim.
///
/// Leading and trailing whitespace of the result is left alone; trimming is
/// the caller's business.
pub fn sanitize(text: &str) -> String {
    let normalized = normalize_line_endings(text);
    let stripped = strip_ansi(&normalized);
    stripped
        .split('\n')
        .filter(|line| !is_noise_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Line starts that some rule may still match once the line is complete.
const NOISE_PREFIXES: &[&str] = &[
    "return only the transformed text.",
    "user instructions:",
    "openai codex v",
    "codex",
    "workdir",
    "provider",
    "approval",
    "sandbox",
    "reasoning",
    "usage",
    "model",
    "tokens",
    "run-id",
    "run_id",
    "run id",
    "runid",
    "session id",
];

/// Whether an unterminated line could still turn out to be noise.
pub fn may_become_noise(partial: &str) -> bool {
    let trimmed = partial.trim_start();
    let Some(first) = trimmed.chars().next() else {
        return true;
    };
    if matches!(first, '`' | '-' | '=' | '_' | '*' | '>' | '|' | '[') {
        return true;
    }
    let mut words = trimmed.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.ends_with(char::is_whitespace) {
        words.push(' ');
    }
    NOISE_PREFIXES
        .iter()
        .any(|prefix| prefix.starts_with(words.as_str()) || words.starts_with(prefix))
}

/// Sanitizes consecutive slices of one stream.
///
/// A slice may begin in the middle of a line that an earlier slice started.
/// Rules only judge lines from their start, so that continuation only has
/// escapes removed.
#[derive(Debug, Default, Clone)]
pub struct StreamSanitizer {
    line_open: bool,
}

impl StreamSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sanitize(&mut self, slice: &str) -> String {
        if slice.is_empty() {
            return String::new();
        }
        let split = if self.line_open {
            slice.find('\n').map_or(slice.len(), |idx| idx + 1)
        } else {
            0
        };
        let (continuation, rest) = slice.split_at(split);
        let mut out = strip_ansi(&normalize_line_endings(continuation));
        out.push_str(&sanitize(rest));
        self.line_open = !slice.ends_with('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drops_fences_and_separators() {
        let raw = "```rust\nfn main() {}\n```\n---\n====\n___  \nkeep";
        assert_eq!(sanitize(raw), "fn main() {}\nkeep");
    }

    #[test]
    fn test_drops_markers_with_flexible_spacing() {
        let raw = "--- input start ---\nbody\n---   INPUT    END---\nafter";
        assert_eq!(sanitize(raw), "body\nafter");
    }

    #[test]
    fn test_drops_guidance_and_instruction_label() {
        let raw = "Return only the transformed text.\nreturn only the transformed text\nUser instructions: shout\nHELLO";
        assert_eq!(sanitize(raw), "HELLO");
    }

    #[test]
    fn test_drops_metadata_lines() {
        let raw = [
            "workdir: /tmp/project",
            "model: gpt-5",
            "provider: openai",
            "approval: never",
            "sandbox: read-only",
            "reasoning effort: medium",
            "reasoning summaries: auto",
            "tokens used: 1,234",
            "run-id=abc",
            "-- usage: 12",
            "the model: stays when not at line start",
        ]
        .join("\n");
        assert_eq!(sanitize(&raw), "the model: stays when not at line start");
    }

    #[test]
    fn test_drops_timestamps_and_banner_lines() {
        let raw = "[2025-01-02T10:11:12] codex\n[2025-01-02 10:11:12] tokens used: 5\ncodex\nOpenAI Codex v0.46.0 (research preview)\ncodex rocks";
        assert_eq!(sanitize(raw), "codex rocks");
    }

    #[test]
    fn test_preserves_blank_lines_and_inner_whitespace() {
        let raw = "  indented  line  \n\n\tTabbed\t\n";
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn test_strips_ansi_and_normalizes_line_endings() {
        let raw = "\x1b[1;31mRED\x1b[0m\r\nnext\rlast\x1b]0;title\x07";
        assert_eq!(sanitize(raw), "RED\nnext\nlast");
    }

    #[test]
    fn test_strips_device_control_strings_with_payload() {
        assert_eq!(strip_ansi("\x1bPq#0;2;0;0;0\x1b\\text"), "text");
        assert_eq!(strip_ansi("\tcol\x1b[1m\tbold\x1b[0m"), "\tcol\tbold");
    }

    #[test]
    fn test_ansi_wrapped_fence_is_still_noise() {
        assert_eq!(sanitize("\x1b[2m```\x1b[0m\nbody"), "body");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let raw = "```js\r\n\x1b[32mconst a = 1;\x1b[0m\r\n```\rmid\n\x1b\x1b[0m[0m\n---\n  tail  ";
        let once = sanitize(raw);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_partial_lines_that_may_become_noise() {
        for partial in ["", "  ", "``", "--", "[2025", "Return only", "return  only the", "tok", "model", "codex rocks"] {
            assert!(may_become_noise(partial), "{partial:?}");
        }
        for partial in ["HELLO", "fn main", "the model", "returning"] {
            assert!(!may_become_noise(partial), "{partial:?}");
        }
    }

    #[test]
    fn test_stream_sanitizer_keeps_continuations() {
        let mut sanitizer = StreamSanitizer::new();
        assert_eq!(sanitizer.sanitize("HELLO "), "HELLO ");
        assert_eq!(sanitizer.sanitize("codex"), "codex");
        assert_eq!(sanitizer.sanitize("\n```\nnext"), "\nnext");
        assert_eq!(sanitizer.sanitize(" line\n"), " line\n");
        assert_eq!(sanitizer.sanitize("codex\n"), "");
    }

    #[test]
    fn test_matching_rule_reports_rule_names() {
        assert_eq!(matching_rule("```"), Some("code_fence"));
        assert_eq!(matching_rule("--- INPUT END ---"), Some("input_end"));
        assert_eq!(matching_rule("plain"), None);
        assert_eq!(rules().len(), 10);
    }
}
