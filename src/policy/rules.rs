//! Pure approval predicates: allowlist, denylist, and approved-record matching.

use std::path::Path;

use crate::models::approval::ApprovedCommandRecord;
use crate::models::policy::DenyRule;
use crate::policy::matcher;

/// Return `true` if `path` matches at least one allowlist pattern.
///
/// Patterns are unordered; any match suffices.
#[must_use]
pub fn allowlisted(path: &Path, patterns: &[String]) -> bool {
    let path = path.to_string_lossy();
    patterns.iter().any(|pattern| matcher::matches(&path, pattern))
}

/// Return `true` if `args`, after removing every neutral flag, begin with a
/// forbidden prefix of any denylist rule for `base_name`.
#[must_use]
pub fn dangerous(
    base_name: &str,
    args: &[String],
    denylist: &[DenyRule],
    neutral_flags: &[String],
) -> bool {
    let normalized: Vec<String> = args
        .iter()
        .filter(|arg| !neutral_flags.contains(arg))
        .cloned()
        .collect();

    denylist
        .iter()
        .filter(|rule| rule.command == base_name)
        .flat_map(|rule| &rule.arg_prefixes)
        .any(|prefix| !prefix.is_empty() && is_prefix(prefix, &normalized))
}

/// Return `true` if `record` approves running `resolved_path` with content
/// `hash` and arguments `args`.
#[must_use]
pub fn matches(
    record: &ApprovedCommandRecord,
    resolved_path: &Path,
    hash: &str,
    args: &[String],
) -> bool {
    record.command_path == resolved_path
        && record.hash == hash
        && is_prefix(&record.args_pattern, args)
}

/// Index-wise prefix check: `prefix.len() <= args.len()` and every element
/// equals the arg at the same index.
fn is_prefix(prefix: &[String], args: &[String]) -> bool {
    prefix.len() <= args.len() && prefix.iter().zip(args).all(|(want, got)| want == got)
}
