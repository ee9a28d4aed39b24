use ctxkit_commons::{
    WORKDIR_PLACEHOLDER, sanitize_error, validate_glob_pattern, validate_path,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

const ROOT: &str = "/repo";

#[test]
fn sensitive_files_are_rejected_anywhere_in_the_sandbox() {
    for name in [".env", ".env.local", "id_rsa", "credentials.json", "nested/dir/server.pem"] {
        let result = validate_path(name, Path::new(ROOT));
        assert!(!result.safe, "{name} should be rejected");
        assert!(result.error.unwrap().contains("sensitive file"));
    }
}

#[test]
fn traversal_and_prefix_collisions_are_rejected() {
    for path in ["../etc/passwd", "src/../../etc", "/etc/passwd", "/repo-evil/file.txt", "/repository"] {
        assert!(!validate_path(path, Path::new(ROOT)).safe, "{path} should be rejected");
    }
}

#[test]
fn paths_inside_the_root_resolve() {
    let result = validate_path("src/./lib/../main.rs", Path::new(ROOT));
    assert!(result.safe);
    assert_eq!(result.resolved_path, Some(PathBuf::from("/repo/src/main.rs")));
    assert_eq!(
        validate_path("/repo", Path::new(ROOT)).resolved_path,
        Some(PathBuf::from(ROOT))
    );
}

#[test]
fn validation_is_deterministic() {
    for path in ["src/main.rs", "../x", ".env"] {
        assert_eq!(validate_path(path, Path::new(ROOT)), validate_path(path, Path::new(ROOT)));
    }
}

#[test]
fn glob_patterns_follow_the_same_rules() {
    assert!(validate_glob_pattern("src/**/*.rs", Path::new(ROOT)).safe);
    assert!(!validate_glob_pattern("/etc/*", Path::new(ROOT)).safe);
    assert!(!validate_glob_pattern("../**/*.rs", Path::new(ROOT)).safe);
    assert!(!validate_glob_pattern("config/.env", Path::new(ROOT)).safe);
}

#[test]
fn sanitizing_is_idempotent_and_removes_the_root() {
    let message = "ENOENT: no such file /repo/src/missing.rs (cwd /repo)";
    let once = sanitize_error(message, Path::new(ROOT));
    assert_eq!(once, format!("ENOENT: no such file {WORKDIR_PLACEHOLDER}/src/missing.rs (cwd {WORKDIR_PLACEHOLDER})"));
    assert_eq!(sanitize_error(&once, Path::new(ROOT)), once);
}
