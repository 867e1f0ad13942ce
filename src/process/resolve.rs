use crate::error::TransformError;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Directory under the per-user config (or local data) dir holding bundled tools.
pub const APP_DIR_NAME: &str = "Editrion";

const SYSTEM_BIN_DIRS: [&str; 3] = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

fn app_bin_dir() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        dirs::config_dir()
    };
    base.map(|dir| dir.join(APP_DIR_NAME).join("bin"))
}

/// Every location searched for `name`, in priority order.
pub fn candidate_paths(name: &str) -> Vec<PathBuf> {
    let exe = executable_name(name);
    let mut candidates = Vec::new();

    let override_var = format!("{}_BIN", name.to_uppercase());
    if let Some(path) = crate::util::non_empty_env(&override_var) {
        candidates.push(PathBuf::from(path));
    }
    if let Some(dir) = app_bin_dir() {
        candidates.push(dir.join(&exe));
    }
    candidates.extend(SYSTEM_BIN_DIRS.iter().map(|dir| PathBuf::from(dir).join(&exe)));
    if let Some(path_var) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&path_var).map(|dir| dir.join(&exe)));
    }
    candidates
}

pub fn resolve_binary_path(name: &str) -> Result<PathBuf, TransformError> {
    candidate_paths(name)
        .into_iter()
        .find(|path| path.is_file())
        .or_else(|| login_shell_lookup(name))
        .ok_or_else(|| TransformError::BinaryNotFound(name.to_string()))
}

/// Asks the user's login shell, whose PATH may differ from ours when launched
/// outside a terminal.
fn login_shell_lookup(name: &str) -> Option<PathBuf> {
    if cfg!(windows) {
        return None;
    }
    let shell = crate::util::non_empty_env("SHELL").unwrap_or_else(|| "/bin/sh".to_string());
    let output = match Command::new(&shell)
        .args(["-lc", "command -v \"$1\"", "sh", name])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(err) => {
            debug!(shell = %shell, error = %err, "login shell lookup failed");
            return None;
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let path = PathBuf::from(stdout.lines().rev().find(|line| !line.trim().is_empty())?.trim());
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENV_LOCK;
    use std::fs;

    const TOOL: &str = "editrion_probe_tool";
    const OVERRIDE_VAR: &str = "EDITRION_PROBE_TOOL_BIN";

    #[test]
    fn test_env_override_wins_when_it_exists() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("custom-tool");
        fs::write(&tool, "#!/bin/sh\n").unwrap();

        std::env::set_var(OVERRIDE_VAR, &tool);
        let resolved = resolve_binary_path(TOOL);
        std::env::remove_var(OVERRIDE_VAR);

        assert_eq!(resolved.unwrap(), tool);
    }

    #[test]
    fn test_missing_override_falls_through_to_path() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join(executable_name(TOOL));
        fs::write(&tool, "#!/bin/sh\n").unwrap();

        let old_path = std::env::var_os("PATH");
        std::env::set_var(OVERRIDE_VAR, dir.path().join("does-not-exist"));
        std::env::set_var("PATH", dir.path());
        let resolved = resolve_binary_path(TOOL);
        std::env::remove_var(OVERRIDE_VAR);
        match old_path {
            Some(path) => std::env::set_var("PATH", path),
            None => std::env::remove_var("PATH"),
        }

        assert_eq!(resolved.unwrap(), tool);
    }

    #[test]
    fn test_unresolvable_binary_is_launch_failure() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let err = resolve_binary_path("editrion-tool-that-does-not-exist").unwrap_err();
        assert!(err.is_launch_failure());
        assert!(matches!(err, TransformError::BinaryNotFound(name) if name == "editrion-tool-that-does-not-exist"));
    }

    #[cfg(unix)]
    #[test]
    fn test_login_shell_is_asked_last() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("installed-elsewhere");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        let shell = dir.path().join("fake-shell");
        fs::write(&shell, format!("#!/bin/sh\necho 'welcome'\necho '{}'\n", tool.display())).unwrap();
        let mut perms = fs::metadata(&shell).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        fs::set_permissions(&shell, perms).unwrap();

        let old_path = std::env::var_os("PATH");
        let old_shell = std::env::var_os("SHELL");
        let empty = tempfile::tempdir().unwrap();
        std::env::set_var("PATH", empty.path());
        std::env::set_var("SHELL", &shell);
        let resolved = resolve_binary_path(TOOL);
        for (key, value) in [("PATH", old_path), ("SHELL", old_shell)] {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }

        assert_eq!(resolved.unwrap(), tool);
    }

    #[test]
    fn test_candidates_keep_search_order() {
        let _env_lock = ENV_LOCK.blocking_lock();
        let candidates = candidate_paths("codex");
        let system = candidates
            .iter()
            .position(|p| p.starts_with("/usr/local/bin"))
            .unwrap();
        let homebrew = candidates
            .iter()
            .position(|p| p.starts_with("/opt/homebrew/bin"))
            .unwrap();
        assert!(homebrew < system);
    }
}
