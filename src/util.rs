/// Parse "true"/"false"/"1"/"0" (and yes/no, on/off) from a &str.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The trimmed value of `name`, or `None` when unset or blank.
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses `START..END` into a pair of char offsets.
pub fn parse_offset_range(s: &str) -> Option<(usize, usize)> {
    let (start, end) = s.trim().split_once("..")?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
