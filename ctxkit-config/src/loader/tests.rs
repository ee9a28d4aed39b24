use super::*;

use crate::constants::{memory, timeouts};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::collections::HashMap;
use std::fs;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn empty_file_yields_defaults() {
    let config = CtxkitConfig::from_toml_str("", Path::new("ctxkit.toml")).expect("parse");
    assert_eq!(config, CtxkitConfig::default());
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let config = CtxkitConfig::from_toml_str(
        "[limits]\ntimeout_ms = 8000\n\n[sdk]\nmax_files = 50\n",
        Path::new("ctxkit.toml"),
    )
    .expect("parse");

    assert_eq!(config.limits.timeout_ms, 8_000);
    assert_eq!(config.limits.max_timeout_ms, timeouts::MAX_TIMEOUT_MS);
    assert_eq!(config.sdk.max_files, 50);
    assert_eq!(config.sdk.max_traversal_depth, 5);
}

#[test]
fn invalid_toml_reports_path() {
    let err = CtxkitConfig::from_toml_str("[limits\n", Path::new("broken.toml"))
        .expect_err("should fail");
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn env_overrides_replace_file_values() {
    let mut config = CtxkitConfig::default();
    config
        .apply_env_overrides(lookup_from(&[
            ("CTXKIT_TIMEOUT_MS", "2000"),
            ("CTXKIT_MEMORY_LIMIT_MB", "64"),
            ("CTXKIT_MAX_OUTPUT_TOKENS", "900"),
        ]))
        .expect("overrides");

    assert_eq!(config.limits.timeout_ms, 2_000);
    assert_eq!(config.limits.memory_limit_bytes, 64 * memory::BYTES_PER_MB);
    assert_eq!(config.limits.max_output_tokens, 900);
    config.validate().expect("still valid");
}

#[test]
fn env_override_rejects_garbage() {
    let mut config = CtxkitConfig::default();
    let err = config
        .apply_env_overrides(lookup_from(&[("CTXKIT_TIMEOUT_MS", "soon")]))
        .expect_err("should fail");
    assert!(matches!(err, ConfigError::InvalidEnv { .. }));
}

#[test]
fn validation_rejects_excessive_ceiling() {
    let mut config = CtxkitConfig::default();
    config
        .apply_env_overrides(lookup_from(&[("CTXKIT_MAX_TIMEOUT_MS", "90000")]))
        .expect("override parses");
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
#[serial]
fn load_reads_workspace_file_when_present() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    fs::write(
        workspace.path().join("ctxkit.toml"),
        "[sdk]\nmax_search_results = 25\n",
    )
    .expect("failed to write config");

    let config = CtxkitConfig::load(None, workspace.path()).expect("load");
    assert_eq!(config.sdk.max_search_results, 25);
}

#[test]
#[serial]
fn load_prefers_explicit_path() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let explicit = workspace.path().join("custom.toml");
    fs::write(&explicit, "[limits]\nmax_output_tokens = 123\n").expect("write");
    fs::write(
        workspace.path().join("ctxkit.toml"),
        "[limits]\nmax_output_tokens = 999\n",
    )
    .expect("write");

    let config = CtxkitConfig::load(Some(&explicit), workspace.path()).expect("load");
    assert_eq!(config.limits.max_output_tokens, 123);
}

#[test]
#[serial]
fn load_missing_explicit_file_fails() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let missing = workspace.path().join("nope.toml");
    let err = CtxkitConfig::load(Some(&missing), workspace.path()).expect_err("missing");
    assert!(matches!(err, ConfigError::Read { .. }));
}
