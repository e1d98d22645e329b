//! Command allow/deny policy.
//!
//! Provides the allowlist glob matcher, the pure approval predicates, and
//! loading of the project-level allowlist override.

pub mod loader;
pub mod matcher;
pub mod rules;
