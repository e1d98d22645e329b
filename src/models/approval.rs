//! Approved command record model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::command::{CommandDecision, DecisionStatus};

/// A prior human decision binding a canonical path, content hash, and
/// argument prefix to "run without prompting".
///
/// Persisted by an external repository; the gateway only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ApprovedCommandRecord {
    /// Unique record identifier.
    pub id: String,
    /// Canonical path of the approved executable.
    pub command_path: PathBuf,
    /// Ordered argument prefix the approval covers.
    #[serde(default)]
    pub args_pattern: Vec<String>,
    /// SHA-256 hex digest of the executable at approval time.
    pub hash: String,
    /// Approval timestamp.
    pub approved_at: DateTime<Utc>,
    /// Last time the record matched an evaluation.
    pub last_seen_at: DateTime<Utc>,
}

impl ApprovedCommandRecord {
    /// Construct a new record approved now.
    #[must_use]
    pub fn new(command_path: PathBuf, args_pattern: Vec<String>, hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            command_path,
            args_pattern,
            hash,
            approved_at: now,
            last_seen_at: now,
        }
    }

    /// Build the record a host would store after a human approves `decision`.
    ///
    /// Returns `None` for denied decisions and for decisions that carry no
    /// hash; denied commands can never be approved.
    #[must_use]
    pub fn from_decision(decision: &CommandDecision) -> Option<Self> {
        if decision.status == DecisionStatus::Denied {
            return None;
        }
        let hash = decision.hash.clone()?;
        Some(Self::new(
            decision.resolved_path.clone(),
            decision.spec.args.clone(),
            hash,
        ))
    }
}
