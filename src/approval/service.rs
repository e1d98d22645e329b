//! Approval service: classifies command specs into decisions.
//!
//! Each command is classified in strict order:
//! 1. Resolve the canonical path (failure aborts the whole call).
//! 2. Not allowlisted → denied, without hashing.
//! 3. Interpreter with an inline-exec flag → denied, even if approved.
//! 4. Hash the file and look for a matching approved record → approved.
//! 5. Otherwise → needs approval (`new_command` or `hash_or_args_changed`).

use std::path::Path;

use tracing::{debug, info_span, Instrument};

use crate::approval::hasher::hash_file;
use crate::approval::resolver::PathResolver;
use crate::models::approval::ApprovedCommandRecord;
use crate::models::command::{CommandDecision, CommandSpec, DecisionReason, DecisionStatus};
use crate::models::policy::ApprovalPolicy;
use crate::policy::rules;
use crate::Result;

/// Evaluates command specs against an injected [`ApprovalPolicy`].
#[derive(Debug, Clone)]
pub struct ApprovalService {
    policy: ApprovalPolicy,
    resolver: PathResolver,
}

impl ApprovalService {
    /// Construct a service that resolves bare names on the process `PATH`.
    #[must_use]
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self {
            policy,
            resolver: PathResolver::new(),
        }
    }

    /// Replace the path resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The policy this service evaluates against.
    #[must_use]
    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Classify each spec, preserving input order.
    ///
    /// Reads the filesystem only; `approved` is never modified.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CommandNotFound` if any command cannot be
    /// resolved (a missing command is never skipped), or `AppError::Io`
    /// if an allowlisted executable cannot be hashed.
    pub async fn evaluate(
        &self,
        specs: &[CommandSpec],
        approved: &[ApprovedCommandRecord],
    ) -> Result<Vec<CommandDecision>> {
        let span = info_span!(
            "approval_evaluate",
            specs = specs.len(),
            approved = approved.len()
        );

        async {
            let mut decisions = Vec::with_capacity(specs.len());
            for spec in specs {
                let decision = self.evaluate_one(spec, approved).await?;
                debug!(
                    command = %spec.command,
                    resolved = %decision.resolved_path.display(),
                    status = ?decision.status,
                    reason = decision.reason.map(DecisionReason::as_str),
                    "command evaluated"
                );
                decisions.push(decision);
            }
            Ok(decisions)
        }
        .instrument(span)
        .await
    }

    async fn evaluate_one(
        &self,
        spec: &CommandSpec,
        approved: &[ApprovedCommandRecord],
    ) -> Result<CommandDecision> {
        let resolved_path = self
            .resolver
            .resolve(&spec.command, spec.cwd.as_deref())
            .await?;

        if !rules::allowlisted(&resolved_path, &self.policy.allowlist) {
            return Ok(decision(
                spec,
                resolved_path,
                None,
                DecisionStatus::Denied,
                Some(DecisionReason::CommandNotAllowlisted),
            ));
        }

        if self.is_dangerous(spec, &resolved_path) {
            return Ok(decision(
                spec,
                resolved_path,
                None,
                DecisionStatus::Denied,
                Some(DecisionReason::DangerousArgCombo),
            ));
        }

        let hash = hash_file(&resolved_path).await?;

        let matched = approved
            .iter()
            .any(|record| rules::matches(record, &resolved_path, &hash, &spec.args));
        if matched {
            return Ok(decision(
                spec,
                resolved_path,
                Some(hash),
                DecisionStatus::Approved,
                None,
            ));
        }

        let known_path = approved
            .iter()
            .any(|record| record.command_path == resolved_path);
        let reason = if known_path {
            DecisionReason::HashOrArgsChanged
        } else {
            DecisionReason::NewCommand
        };

        Ok(decision(
            spec,
            resolved_path,
            Some(hash),
            DecisionStatus::NeedsApproval,
            Some(reason),
        ))
    }

    /// Check the denylist against both the canonical base name and the
    /// name the caller wrote, so `sh` is caught even when it resolves to
    /// `dash`.
    fn is_dangerous(&self, spec: &CommandSpec, resolved_path: &Path) -> bool {
        [resolved_path, Path::new(&spec.command)]
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy())
            .any(|name| {
                rules::dangerous(
                    &name,
                    &spec.args,
                    &self.policy.denylist,
                    &self.policy.neutral_flags,
                )
            })
    }
}

impl Default for ApprovalService {
    fn default() -> Self {
        Self::new(ApprovalPolicy::default())
    }
}

fn decision(
    spec: &CommandSpec,
    resolved_path: std::path::PathBuf,
    hash: Option<String>,
    status: DecisionStatus,
    reason: Option<DecisionReason>,
) -> CommandDecision {
    CommandDecision {
        spec: spec.clone(),
        resolved_path,
        hash,
        status,
        reason,
    }
}
