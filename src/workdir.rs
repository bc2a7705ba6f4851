//! Staging a patched copy of the working directory.
//!
//! When the working directory carries a tap configuration, everything in it
//! except root-level `*.tf` files is copied into `<dir>/.tap`, the patched
//! configuration is written to `<dir>/.tap/main.tf`, and the downstream
//! tool is pointed there with `-chdir`. State files already in `.tap`
//! survive every run.

use crate::tap::{self, apply_patches, ApplyError, OperationReport, SpecLoadError};
use crate::terraform::{
    merge_module, write_module, DocumentProvider, FileSink, LoadError, Module, PublishOutcome,
    WriteError,
};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const TAP_DIR: &str = ".tap";
pub const OUTPUT_FILE: &str = "main.tf";

const CHDIR: &str = "-chdir";
const CHDIR_PREFIX: &str = "-chdir=";

#[derive(Error, Debug)]
pub enum WorkdirError {
    #[error("-chdir must include an equals sign followed by a directory path, like -chdir=example")]
    ChdirWithoutValue,

    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no terraform configuration files found in {}", .0.display())]
    NoConfiguration(PathBuf),

    #[error("error loading tap configuration: {0}")]
    Spec(#[from] SpecLoadError),

    #[error("error loading terraform configuration: {0}")]
    Load(#[from] LoadError),

    #[error("error applying tap configuration: {0}")]
    Apply(#[from] ApplyError),

    #[error("error writing terraform configuration: {0}")]
    Write(#[from] WriteError),
}

fn io_error<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> WorkdirError + 'a {
    move |source| WorkdirError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Result of [`setup`].
#[derive(Debug)]
pub struct Staged {
    /// Arguments for the downstream tool, starting with `-chdir=...`.
    pub args: Vec<String>,
    /// Per-operation results; empty when the directory has no tap config.
    pub reports: Vec<OperationReport>,
    pub published: Option<PublishOutcome>,
}

/// Pull `-chdir=DIR` out of the leading options.
///
/// Only options before the first non-option argument are considered; the
/// last `-chdir=` among them wins.
pub fn extract_chdir(args: Vec<String>) -> Result<(Option<String>, Vec<String>), WorkdirError> {
    let mut found = None;
    for (idx, arg) in args.iter().enumerate() {
        if !arg.starts_with('-') {
            break;
        }
        if arg == CHDIR || arg == CHDIR_PREFIX {
            return Err(WorkdirError::ChdirWithoutValue);
        }
        if let Some(value) = arg.strip_prefix(CHDIR_PREFIX) {
            found = Some((idx, value.to_string()));
        }
    }
    match found {
        Some((idx, dir)) => {
            let mut rest = args;
            rest.remove(idx);
            Ok((Some(dir), rest))
        }
        None => Ok((None, args)),
    }
}

/// Load the configuration in `dir` and collapse its overrides.
pub fn load_module(dir: &Path, provider: &dyn DocumentProvider) -> Result<Module, WorkdirError> {
    let module = provider
        .load_module(dir)?
        .ok_or_else(|| WorkdirError::NoConfiguration(dir.to_path_buf()))?;
    Ok(merge_module(module))
}

/// Prepare the downstream invocation for `args`.
pub fn setup(args: Vec<String>, provider: &dyn DocumentProvider) -> Result<Staged, WorkdirError> {
    let (chdir, rest) = extract_chdir(args)?;
    let working_dir = match chdir {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir().map_err(WorkdirError::CurrentDir)?,
    };

    let Some(spec) = tap::load_from_dir(&working_dir)? else {
        debug!(dir = %working_dir.display(), "no tap configuration, passing through");
        return Ok(Staged {
            args: with_chdir(&working_dir, rest),
            reports: Vec::new(),
            published: None,
        });
    };

    let tap_dir = working_dir.join(TAP_DIR);
    clean_dir(&tap_dir)?;

    let mut module = load_module(&working_dir, provider)?;
    let reports = apply_patches(&mut module, &spec)?;

    copy_dir(&working_dir, &tap_dir)?;
    let published = write_module(&module, &mut FileSink::new(tap_dir.join(OUTPUT_FILE)))?;
    info!(dir = %tap_dir.display(), operations = reports.len(), "staged patched configuration");

    Ok(Staged {
        args: with_chdir(&tap_dir, rest),
        reports,
        published: Some(published),
    })
}

fn with_chdir(dir: &Path, rest: Vec<String>) -> Vec<String> {
    let mut args = Vec::with_capacity(rest.len() + 1);
    args.push(format!("{CHDIR_PREFIX}{}", dir.display()));
    args.extend(rest);
    args
}

pub fn is_state_file(name: &str) -> bool {
    name.ends_with(".tfstate") || name.ends_with(".tfstate.backup")
}

/// Empty `dir`, keeping state files at its top level.
pub fn clean_dir(dir: &Path) -> Result<(), WorkdirError> {
    match fs::symlink_metadata(dir) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_error("inspect", dir)(err)),
        Ok(_) => {}
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| io_error("read", dir)(err.into()))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir_all(path).map_err(io_error("remove", path))?;
        } else if !is_state_file(&entry.file_name().to_string_lossy()) {
            fs::remove_file(path).map_err(io_error("remove", path))?;
        }
    }
    Ok(())
}

/// Copy `src` into `dst`, skipping `.tap` directories and root-level
/// `*.tf` files, and never overwriting a state file already in `dst`.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<(), WorkdirError> {
    match fs::create_dir(dst) {
        Err(err) if err.kind() != io::ErrorKind::AlreadyExists => {
            return Err(io_error("create", dst)(err));
        }
        _ => {}
    }
    let src = fs::canonicalize(src).map_err(io_error("resolve", src))?;

    let walker = WalkDir::new(&src)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == TAP_DIR));
    for entry in walker {
        let entry = entry.map_err(|err| io_error("read", &src)(err.into()))?;
        let path = entry.path();
        let file_type = entry.file_type();
        let name = entry.file_name().to_string_lossy();

        if entry.depth() == 1 && !file_type.is_dir() && name.ends_with(".tf") {
            continue;
        }

        let Ok(relative) = path.strip_prefix(&src) else {
            continue;
        };
        let target = dst.join(relative);

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_error("create", &target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(path).map_err(io_error("read link", path))?;
            recreate_symlink(&link, path, &target)?;
        } else if is_state_file(&name) && fs::symlink_metadata(&target).is_ok() {
            debug!(file = %target.display(), "keeping existing state file");
        } else {
            fs::copy(path, &target).map_err(io_error("copy", path))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn recreate_symlink(link: &Path, _source: &Path, target: &Path) -> Result<(), WorkdirError> {
    std::os::unix::fs::symlink(link, target).map_err(io_error("link", target))
}

#[cfg(not(unix))]
fn recreate_symlink(_link: &Path, source: &Path, target: &Path) -> Result<(), WorkdirError> {
    fs::copy(source, target)
        .map(|_| ())
        .map_err(io_error("copy", source))
}
