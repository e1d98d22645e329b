//! Project-level allowlist override loader.
//!
//! Parses `.command-gate/allowlist.json` from a project root. On any read or
//! parse problem the caller-supplied fallback is used and a tracing warning
//! is emitted; the file format never leaks past this module.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

/// Relative path within a project root to the allowlist override file.
pub const ALLOWLIST_PATH: &str = ".command-gate/allowlist.json";

/// Loads the effective allowlist for a project.
pub struct AllowlistLoader;

impl AllowlistLoader {
    /// Load the allowlist from `{project_root}/.command-gate/allowlist.json`.
    ///
    /// # Behaviour
    ///
    /// - **Missing file**: returns `fallback`.
    /// - **Unreadable, empty, or malformed file**: returns `fallback` and logs a warning.
    /// - **Valid JSON array of strings**: returns the array (an empty array
    ///   is valid and denies everything).
    #[must_use]
    pub fn load(project_root: &Path, fallback: &[String]) -> Vec<String> {
        let file = project_root.join(ALLOWLIST_PATH);

        if !file.exists() {
            debug!(path = %file.display(), "no allowlist override, using fallback");
            return fallback.to_vec();
        }

        let raw = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    path = %file.display(),
                    %err,
                    "failed to read allowlist override, using fallback"
                );
                return fallback.to_vec();
            }
        };

        if raw.trim().is_empty() {
            warn!(path = %file.display(), "allowlist override is empty, using fallback");
            return fallback.to_vec();
        }

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(
                    path = %file.display(),
                    %err,
                    "malformed allowlist override, using fallback"
                );
                fallback.to_vec()
            }
        }
    }
}
