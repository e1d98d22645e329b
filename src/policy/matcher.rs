//! Path-segment glob matcher for allowlist patterns.
//!
//! Patterns are split on `/` and matched segment by segment. A `**`
//! segment consumes zero or more whole path segments; every other segment
//! is a single-segment wildcard (`*`, `?`, `[...]`). A pattern without any
//! `/` is matched against the final path segment only, so `git` allows
//! `/usr/bin/git`.
//!
//! Dot-prefixed segments get no special treatment: `**`, `*` and `?` match
//! them like any other segment. Tool installs commonly live under
//! `~/.local`, `~/.cargo` or `~/.nvm`, so `**/git` allows
//! `/home/u/.local/bin/git` and `/home/*/bin/git` allows `/home/.x/bin/git`.

use glob::{MatchOptions, Pattern};
use tracing::warn;

const SEGMENT_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Return `true` if `path` matches `pattern`.
#[must_use]
pub fn matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let path = normalize_separators(path);
    let path_segments = segments(&path);

    if !pattern.contains('/') {
        return path_segments
            .last()
            .is_some_and(|name| segment_matches(name, pattern));
    }

    let pattern_segments = segments(pattern);

    // Anchoring: `/usr/bin/git` never matches a relative path, and `bin/git`
    // never matches an absolute one, unless the pattern opens with `**`.
    let leading_globstar = pattern_segments.first() == Some(&"**");
    if !leading_globstar && pattern.starts_with('/') != path.starts_with('/') {
        return false;
    }

    match_segments(&pattern_segments, &path_segments)
}

fn normalize_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_owned()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn segments(value: &str) -> Vec<&str> {
    value.split('/').filter(|seg| !seg.is_empty()).collect()
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((segment, rest)) => path
            .split_first()
            .is_some_and(|(name, tail)| segment_matches(name, segment) && match_segments(rest, tail)),
    }
}

fn segment_matches(name: &str, segment: &str) -> bool {
    if !segment.contains(['*', '?', '[']) {
        return name == segment;
    }
    match Pattern::new(segment) {
        Ok(compiled) => compiled.matches_with(name, SEGMENT_OPTIONS),
        Err(err) => {
            warn!(pattern = %segment, %err, "invalid allowlist glob segment, skipping");
            false
        }
    }
}
