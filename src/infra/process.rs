//! External process execution
//!
//! Thin wrappers over [`std::process::Command`] that capture output and turn
//! failures into readable messages. Callers map the result into their own
//! error type.

use std::env::JoinPathsError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Lines of stderr kept in failure messages
const STDERR_TAIL_LINES: usize = 20;

/// Run a command to completion, capturing stdout and stderr
///
/// Returns `Err` with a message when the process cannot be spawned or exits
/// unsuccessfully.
pub fn run_captured(command: &mut Command) -> Result<Output, String> {
    let program = command.get_program().to_string_lossy().into_owned();
    tracing::debug!("Running {program} {:?}", command.get_args().collect::<Vec<_>>());

    let output = command
        .output()
        .map_err(|e| format!("failed to run '{program}': {e}"))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        tracing::debug!("[{program}] {line}");
    }

    if output.status.success() {
        Ok(output)
    } else {
        Err(describe_failure(&output))
    }
}

/// `exit status N` followed by the tail of stderr
pub fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = &lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..];
    if tail.is_empty() {
        output.status.to_string()
    } else {
        format!("{}\n{}", output.status, tail.join("\n"))
    }
}

/// `PATH` value with `dirs` prepended, in order, to `existing`
///
/// Fails when a directory contains the platform's path separator.
pub fn prepend_path<P: AsRef<Path>>(
    dirs: &[P],
    existing: Option<&OsStr>,
) -> Result<OsString, JoinPathsError> {
    let mut paths: Vec<PathBuf> = dirs.iter().map(|d| d.as_ref().to_path_buf()).collect();
    if let Some(existing) = existing {
        paths.extend(std::env::split_paths(existing));
    }
    std::env::join_paths(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_captured_success() {
        let output = run_captured(Command::new("sh").args(["-c", "echo hello"])).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captured_failure_includes_stderr() {
        let err = run_captured(Command::new("sh").args(["-c", "echo broken >&2; exit 3"])).unwrap_err();
        assert!(err.contains("3"));
        assert!(err.contains("broken"));
    }

    #[test]
    fn test_run_captured_missing_program() {
        let err = run_captured(&mut Command::new("/nonexistent/definitely-missing")).unwrap_err();
        assert!(err.contains("failed to run"));
    }

    #[cfg(unix)]
    #[test]
    fn test_prepend_path_keeps_order() {
        let path = prepend_path(&["/a", "/b"], Some(OsStr::new("/usr/bin:/bin"))).unwrap();
        assert_eq!(path, OsString::from("/a:/b:/usr/bin:/bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_prepend_path_rejects_separator_in_dir() {
        assert!(prepend_path(&["/opt/a:b/bin"], Some(OsStr::new("/usr/bin"))).is_err());
    }
}
