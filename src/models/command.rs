//! Command request and approval decision models.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A caller-supplied request to run an external program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandSpec {
    /// Absolute, relative, or bare command name.
    pub command: String,
    /// Ordered argument list.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory used to resolve relative commands.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Construct a spec with no working directory.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
        }
    }

    /// Set the working directory for this spec.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Outcome classification for a single command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// A matching approved record exists; the command may run.
    Approved,
    /// A human must approve the command before it runs.
    NeedsApproval,
    /// The command must not run.
    Denied,
}

/// Machine-readable reason attached to non-approved decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Resolved path matched no allowlist pattern.
    CommandNotAllowlisted,
    /// Interpreter invoked with an inline-execution flag.
    DangerousArgCombo,
    /// No approved record exists for the resolved path.
    NewCommand,
    /// A record exists for the path but its hash or args prefix no longer match.
    HashOrArgsChanged,
}

impl DecisionReason {
    /// Stable string form, identical to the serialized value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandNotAllowlisted => "command_not_allowlisted",
            Self::DangerousArgCombo => "dangerous_arg_combo",
            Self::NewCommand => "new_command",
            Self::HashOrArgsChanged => "hash_or_args_changed",
        }
    }
}

impl Display for DecisionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one [`CommandSpec`].
///
/// Produced fresh on every evaluation; never cached or persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandDecision {
    /// The evaluated request.
    pub spec: CommandSpec,
    /// Canonical, symlink-resolved path of the command.
    pub resolved_path: PathBuf,
    /// SHA-256 hex digest; absent when the command was denied before hashing.
    pub hash: Option<String>,
    /// Decision outcome.
    pub status: DecisionStatus,
    /// Reason for a denial or pending approval.
    pub reason: Option<DecisionReason>,
}

impl CommandDecision {
    /// Whether the command may run without prompting.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }
}
