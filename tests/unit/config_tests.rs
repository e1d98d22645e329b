//! Unit tests for `GatewayConfig` parsing, validation, and derived paths.

use std::fs;
use std::time::Duration;

use command_gate::models::policy::{default_denylist, DEFAULT_ALLOWLIST};
use command_gate::{AppError, GatewayConfig};

fn toml_for(root: &std::path::Path, extra: &str) -> String {
    format!(
        "project_root = '{}'\n{extra}",
        root.to_str().expect("utf-8 path")
    )
}

#[test]
fn minimal_config_uses_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GatewayConfig::from_toml_str(&toml_for(temp.path(), "")).expect("parse");

    assert_eq!(config.project_root, temp.path().canonicalize().expect("canonical"));
    assert_eq!(config.process.kill_grace_ms, 5000);
    assert_eq!(config.process.default_timeout_ms, 0);
    assert!(config.process.audit);
    assert_eq!(config.kill_grace(), Duration::from_millis(5000));
    assert!(config.allowlist.is_none());
    assert!(config.denylist.is_none());
}

#[test]
fn process_section_overrides_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = toml_for(
        temp.path(),
        "[process]\nkill_grace_ms = 250\ndefault_timeout_ms = 30000\naudit = false\n",
    );
    let config = GatewayConfig::from_toml_str(&raw).expect("parse");

    assert_eq!(config.kill_grace(), Duration::from_millis(250));
    assert_eq!(config.process.default_timeout_ms, 30_000);
    assert!(!config.process.audit);
}

#[test]
fn derived_paths_live_under_state_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GatewayConfig::for_project(temp.path()).expect("config");
    let state = config.project_root.join(".command-gate");

    assert_eq!(config.state_dir(), state);
    assert_eq!(config.registry_path(), state.join("local").join("processes.json"));
    assert_eq!(config.allowlist_path(), state.join("allowlist.json"));
    assert_eq!(config.audit_dir(), state.join("logs"));
}

#[test]
fn missing_project_root_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GatewayConfig::for_project(temp.path().join("absent"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_toml_is_config_error() {
    let result = GatewayConfig::from_toml_str("project_root = [");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn denylist_rule_needs_command_and_prefixes() {
    let temp = tempfile::tempdir().expect("tempdir");

    let empty_command = toml_for(
        temp.path(),
        "[[denylist]]\ncommand = ''\narg_prefixes = [['-c']]\n",
    );
    assert!(matches!(
        GatewayConfig::from_toml_str(&empty_command),
        Err(AppError::Config(_))
    ));

    let empty_prefix = toml_for(
        temp.path(),
        "[[denylist]]\ncommand = 'bash'\narg_prefixes = [[]]\n",
    );
    assert!(matches!(
        GatewayConfig::from_toml_str(&empty_prefix),
        Err(AppError::Config(_))
    ));
}

#[test]
fn policy_defaults_apply_without_overrides() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = GatewayConfig::for_project(temp.path()).expect("config");
    let policy = config.approval_policy();

    let expected: Vec<String> = DEFAULT_ALLOWLIST.iter().map(|&p| p.to_owned()).collect();
    assert_eq!(policy.allowlist, expected);
    assert_eq!(policy.denylist, default_denylist());
    assert!(policy.neutral_flags.contains(&"--norc".to_owned()));
}

#[test]
fn configured_lists_replace_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = toml_for(
        temp.path(),
        "allowlist = ['**/cargo']\nneutral_flags = []\n\n[[denylist]]\ncommand = 'deno'\narg_prefixes = [['eval']]\n",
    );
    let policy = GatewayConfig::from_toml_str(&raw)
        .expect("parse")
        .approval_policy();

    assert_eq!(policy.allowlist, vec!["**/cargo".to_owned()]);
    assert!(policy.neutral_flags.is_empty());
    assert_eq!(policy.denylist.len(), 1);
    assert_eq!(policy.denylist[0].command, "deno");
}

#[test]
fn project_override_file_beats_configured_allowlist() {
    let temp = tempfile::tempdir().expect("tempdir");
    let raw = toml_for(temp.path(), "allowlist = ['**/cargo']\n");
    let config = GatewayConfig::from_toml_str(&raw).expect("parse");
    fs::create_dir_all(config.state_dir()).expect("mkdir");
    fs::write(config.allowlist_path(), r#"["**/make"]"#).expect("write override");

    assert_eq!(config.approval_policy().allowlist, vec!["**/make".to_owned()]);
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("command-gate.toml");
    fs::write(&path, toml_for(temp.path(), "")).expect("write config");

    let config = GatewayConfig::load_from_path(&path).expect("load");
    assert_eq!(config.project_root, temp.path().canonicalize().expect("canonical"));
}

#[test]
fn load_from_missing_path_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GatewayConfig::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
