//! Allow/deny policy model.

use serde::{Deserialize, Serialize};

/// Executables permitted to run at all when no allowlist is configured.
pub const DEFAULT_ALLOWLIST: &[&str] = &[
    "**/git", "**/gh", "**/glab", "**/node", "**/npm", "**/npx",
];

/// Flags stripped from argument lists before denylist matching.
///
/// Profile/rc-skip flags change nothing about what an interpreter executes,
/// so `bash --norc -c …` must be caught exactly like `bash -c …`.
pub const DEFAULT_NEUTRAL_FLAGS: &[&str] = &["--noprofile", "--norc"];

/// An interpreter whose inline-execution flags are blocked unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DenyRule {
    /// Executable base name (e.g. `bash`).
    pub command: String,
    /// Forbidden leading argument sequences (e.g. `[["-c"]]`).
    pub arg_prefixes: Vec<Vec<String>>,
}

impl DenyRule {
    /// Construct a rule from string slices.
    #[must_use]
    pub fn new(command: &str, arg_prefixes: &[&[&str]]) -> Self {
        Self {
            command: command.to_owned(),
            arg_prefixes: arg_prefixes
                .iter()
                .map(|prefix| prefix.iter().map(|&arg| arg.to_owned()).collect())
                .collect(),
        }
    }
}

/// Built-in interpreter denylist.
#[must_use]
pub fn default_denylist() -> Vec<DenyRule> {
    vec![
        DenyRule::new("bash", &[&["-c"]]),
        DenyRule::new("sh", &[&["-c"]]),
        DenyRule::new("zsh", &[&["-c"]]),
        DenyRule::new("python", &[&["-c"]]),
        DenyRule::new("python3", &[&["-c"]]),
        DenyRule::new("node", &[&["-e"], &["--eval"]]),
        DenyRule::new("perl", &[&["-e"]]),
        DenyRule::new("ruby", &[&["-e"]]),
    ]
}

/// Approval policy injected into [`crate::approval::service::ApprovalService`].
///
/// A plain value: there is no process-wide default state. Use
/// [`ApprovalPolicy::default`] for the built-in lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Glob patterns naming executables permitted to run.
    pub allowlist: Vec<String>,
    /// Interpreter rules blocked regardless of approval status.
    pub denylist: Vec<DenyRule>,
    /// Flags removed from args before denylist matching.
    pub neutral_flags: Vec<String>,
}

impl ApprovalPolicy {
    /// Default policy with a custom allowlist.
    #[must_use]
    pub fn with_allowlist(allowlist: Vec<String>) -> Self {
        Self {
            allowlist,
            ..Self::default()
        }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            allowlist: DEFAULT_ALLOWLIST.iter().map(|&p| p.to_owned()).collect(),
            denylist: default_denylist(),
            neutral_flags: DEFAULT_NEUTRAL_FLAGS
                .iter()
                .map(|&f| f.to_owned())
                .collect(),
        }
    }
}
