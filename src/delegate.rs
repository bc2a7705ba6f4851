//! Running the downstream terraform-compatible tool.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming the downstream binary explicitly.
pub const BIN_ENV: &str = "TF_TAP_BIN";

/// Binaries looked up on `PATH`, in order.
pub const CANDIDATES: &[&str] = &["terraform", "tofu"];

#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("none of {} found on PATH; set {BIN_ENV} or pass --tf-bin", CANDIDATES.join(", "))]
    NotFound,

    #[error("downstream binary does not exist: {}", .0.display())]
    MissingBinary(PathBuf),

    #[error("failed to run {}: {source}", bin.display())]
    Spawn {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Pick the downstream binary: an explicit path, then `TF_TAP_BIN`, then
/// the first of [`CANDIDATES`] on `PATH`.
pub fn find_binary(explicit: Option<&Path>) -> Result<PathBuf, DelegateError> {
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(BIN_ENV).filter(|v| !v.is_empty()).map(PathBuf::from));
    if let Some(bin) = configured {
        // Bare names are looked up like any other command.
        if bin.components().count() == 1 {
            if let Some(found) = bin.to_str().and_then(find_in_path) {
                return Ok(found);
            }
        }
        return if bin.is_file() {
            Ok(bin)
        } else {
            Err(DelegateError::MissingBinary(bin))
        };
    }

    CANDIDATES
        .iter()
        .find_map(|name| find_in_path(name))
        .ok_or(DelegateError::NotFound)
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for segment in env::split_paths(&path_var) {
        let candidate = segment.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Whether the downstream invocation asks for its version in text form.
///
/// The caller prints its own version first in that case; `-json` output is
/// left untouched so it stays machine readable.
pub fn is_version_request(args: &[String]) -> bool {
    let asks = args
        .iter()
        .any(|arg| matches!(arg.as_str(), "version" | "-v" | "-version" | "--version"));
    asks && !args.iter().any(|arg| arg == "-json")
}

/// Run `bin` with `args` and inherited stdio, returning its exit code.
///
/// A child killed by a signal reports 1.
pub fn run(bin: &Path, args: &[String]) -> Result<i32, DelegateError> {
    info!(bin = %bin.display(), args = ?args, "delegating");
    let status = Command::new(bin)
        .args(args)
        .status()
        .map_err(|source| DelegateError::Spawn {
            bin: bin.to_path_buf(),
            source,
        })?;
    let code = status.code().unwrap_or(1);
    debug!(code, "downstream exited");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_version_requests() {
        assert!(is_version_request(&args(&["version"])));
        assert!(is_version_request(&args(&["-chdir=x", "-v"])));
        assert!(is_version_request(&args(&["--version"])));
        assert!(!is_version_request(&args(&["version", "-json"])));
        assert!(!is_version_request(&args(&["plan"])));
    }

    #[test]
    fn explicit_binary_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("terraform");
        assert!(matches!(
            find_binary(Some(&missing)),
            Err(DelegateError::MissingBinary(_))
        ));

        std::fs::write(&missing, "").unwrap();
        assert_eq!(find_binary(Some(&missing)).unwrap(), missing);
    }

    #[cfg(unix)]
    #[test]
    fn passes_exit_codes_through() {
        let ok = run(Path::new("/bin/sh"), &args(&["-c", "exit 0"])).unwrap();
        let failed = run(Path::new("/bin/sh"), &args(&["-c", "exit 3"])).unwrap();
        assert_eq!((ok, failed), (0, 3));
    }

    #[test]
    fn spawn_failures_are_errors() {
        let dir = TempDir::new().unwrap();
        let err = run(&dir.path().join("nope"), &[]).unwrap_err();
        assert!(matches!(err, DelegateError::Spawn { .. }));
    }
}
