//! Prompt construction. The markers here are the ones the sanitizer and the
//! reassembler look for in the tool's echo.

pub const INPUT_START_MARKER: &str = "--- INPUT START ---";
pub const INPUT_END_MARKER: &str = "--- INPUT END ---";
pub const GUIDANCE: &str = "Return only the transformed text.";

pub fn build_prompt(instruction: &str, selection: &str) -> String {
    format!(
        "{}\n\n{INPUT_START_MARKER}\n{selection}\n{INPUT_END_MARKER}\n{GUIDANCE}",
        instruction.trim()
    )
}
