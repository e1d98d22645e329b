//! Command path resolution.
//!
//! Turns a raw command string into the canonical, symlink-resolved path
//! used as the approval identity. Bare names are searched on `PATH` in
//! listed order, mirroring the shell, so allowlist decisions are
//! predictable.

use std::env;
use std::ffi::OsString;
use std::path::{self, Path, PathBuf};

use tracing::debug;

use crate::{AppError, Result};

/// Resolves commands to canonical absolute paths.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    /// Search path override; `PATH` is read at resolve time when unset.
    search_path: Option<OsString>,
}

impl PathResolver {
    /// Resolver that searches the process `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that searches `search_path` (same syntax as `PATH`) instead
    /// of the process environment.
    #[must_use]
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    /// Resolve `command` to its canonical path.
    ///
    /// Commands that are absolute or contain a path separator are joined
    /// onto `cwd` (default: the process working directory) and must exist.
    /// Bare names resolve to the first executable regular file found on the
    /// search path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CommandNotFound` if nothing matches, or
    /// `AppError::Io` if the process working directory is unavailable.
    pub async fn resolve(&self, command: &str, cwd: Option<&Path>) -> Result<PathBuf> {
        if command.is_empty() {
            return Err(AppError::CommandNotFound("empty command".into()));
        }

        if Path::new(command).is_absolute() || command.contains(path::is_separator) {
            let candidate = base_dir(cwd)?.join(command);
            return tokio::fs::canonicalize(&candidate).await.map_err(|err| {
                AppError::CommandNotFound(format!("{command} ({}): {err}", candidate.display()))
            });
        }

        let search_path = self
            .search_path
            .clone()
            .or_else(|| env::var_os("PATH"))
            .unwrap_or_default();

        for dir in env::split_paths(&search_path) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let candidate = dir.join(command);
            if !is_executable_file(&candidate).await {
                continue;
            }
            match tokio::fs::canonicalize(&candidate).await {
                Ok(resolved) => return Ok(resolved),
                Err(err) => {
                    debug!(candidate = %candidate.display(), %err, "cannot canonicalize path candidate");
                }
            }
        }

        Err(AppError::CommandNotFound(command.to_owned()))
    }
}

fn base_dir(cwd: Option<&Path>) -> Result<PathBuf> {
    match cwd {
        Some(dir) if dir.is_absolute() => Ok(dir.to_path_buf()),
        Some(dir) => Ok(current_dir()?.join(dir)),
        None => current_dir(),
    }
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir()
        .map_err(|err| AppError::Io(format!("cannot read working directory: {err}")))
}

async fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
