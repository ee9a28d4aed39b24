//! Sandbox path containment.
//!
//! Every SDK operation that touches the filesystem asks this module first.
//! [`validate_path`] and [`validate_glob_pattern`] are lexical, so they stay
//! pure functions of `(path, working_dir)`. Callers that go on to open a file
//! re-check the canonical location with [`ensure_canonical_containment`],
//! which catches symlinks that point outside the root.

use glob::Pattern;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

/// Basenames that are never readable, even inside the sandbox root.
pub const SENSITIVE_FILE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "id_rsa*",
    "id_ed25519*",
    "*credentials*",
    "*secrets*.*",
    "*.keystore",
];

static SENSITIVE_MATCHERS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    SENSITIVE_FILE_PATTERNS
        .iter()
        .map(|pattern| compile_pattern(pattern))
        .collect()
});

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Why a path or glob was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathRejection {
    #[error("Path must not be empty")]
    Empty,
    #[error("Path contains a NUL byte")]
    NulByte,
    #[error("Path '{0}' resolves outside the sandbox boundary")]
    OutsideSandbox(String),
    #[error("Access to sensitive file blocked: {0}")]
    SensitiveFile(String),
    #[error("Absolute glob patterns are not allowed: '{0}'")]
    AbsoluteGlob(String),
    #[error("Glob pattern '{0}' must not contain '..' segments")]
    GlobTraversal(String),
    #[error("Path '{0}' resolves through a link outside the sandbox boundary")]
    LinkEscape(String),
    #[error("Path '{0}' does not exist")]
    NotFound(String),
}

/// Outcome of a path or glob check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathValidation {
    pub safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<PathBuf, PathRejection>> for PathValidation {
    fn from(result: Result<PathBuf, PathRejection>) -> Self {
        match result {
            Ok(resolved) => Self {
                safe: true,
                resolved_path: Some(resolved),
                error: None,
            },
            Err(rejection) => Self {
                safe: false,
                resolved_path: None,
                error: Some(rejection.to_string()),
            },
        }
    }
}

/// Normalize a path by resolving `.` and `..` components lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Canonicalize a path with fallback to the normalized path if canonicalization fails.
pub fn canonicalize_workspace(workspace_root: &Path) -> PathBuf {
    std::fs::canonicalize(workspace_root).unwrap_or_else(|error| {
        warn!(
            path = %workspace_root.display(),
            %error,
            "Failed to canonicalize sandbox root; falling back to normalized path"
        );
        normalize_path(workspace_root)
    })
}

/// Returns true when `name` (a basename) belongs to the sensitive-file set.
pub fn is_sensitive_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_MATCHERS.iter().any(|pattern| pattern.matches(&lower))
}

/// Typed form of [`validate_path`].
pub fn check_path(path: &str, working_dir: &Path) -> Result<PathBuf, PathRejection> {
    if path.is_empty() {
        return Err(PathRejection::Empty);
    }
    if path.contains('\0') {
        return Err(PathRejection::NulByte);
    }

    let root = normalize_path(working_dir);
    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = normalize_path(&joined);

    if !is_within_root(&resolved, &root) {
        return Err(PathRejection::OutsideSandbox(path.to_string()));
    }

    if let Some(name) = resolved.file_name().and_then(|name| name.to_str())
        && is_sensitive_file_name(name)
    {
        return Err(PathRejection::SensitiveFile(name.to_string()));
    }

    Ok(resolved)
}

/// Decide whether `path` may be touched from a sandbox rooted at `working_dir`.
///
/// Relative paths resolve against the root; absolute paths must already lie
/// beneath it. Both sides are normalized lexically before comparison, and the
/// comparison is component-wise, so a sibling such as `/repo-evil` is not
/// considered inside `/repo`. Sensitive basenames are refused even inside the
/// root.
pub fn validate_path(path: &str, working_dir: &Path) -> PathValidation {
    check_path(path, working_dir).into()
}

/// Typed form of [`validate_glob_pattern`]. On success the returned path is
/// the directory the pattern's literal prefix resolves to.
pub fn check_glob_pattern(pattern: &str, working_dir: &Path) -> Result<PathBuf, PathRejection> {
    if pattern.is_empty() {
        return Err(PathRejection::Empty);
    }
    if pattern.contains('\0') {
        return Err(PathRejection::NulByte);
    }
    if is_absolute_pattern(pattern) {
        return Err(PathRejection::AbsoluteGlob(pattern.to_string()));
    }

    let segments: Vec<&str> = pattern
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.iter().any(|segment| *segment == "..") {
        return Err(PathRejection::GlobTraversal(pattern.to_string()));
    }

    if let Some(last) = segments.last()
        && !last.contains(GLOB_META)
        && is_sensitive_file_name(last)
    {
        return Err(PathRejection::SensitiveFile((*last).to_string()));
    }

    let literal_prefix: PathBuf = segments
        .iter()
        .take_while(|segment| !segment.contains(GLOB_META))
        .collect();

    let root = normalize_path(working_dir);
    let resolved = normalize_path(&root.join(literal_prefix));
    if !is_within_root(&resolved, &root) {
        return Err(PathRejection::OutsideSandbox(pattern.to_string()));
    }

    Ok(resolved)
}

/// Glob counterpart of [`validate_path`]: rejects absolute roots, `..`
/// segments, literal prefixes that leave the root and literal sensitive
/// basenames.
pub fn validate_glob_pattern(pattern: &str, working_dir: &Path) -> PathValidation {
    check_glob_pattern(pattern, working_dir).into()
}

/// Resolve symlinks on an already validated path and verify that the real
/// location is still inside the canonical sandbox root and not a sensitive file.
pub fn ensure_canonical_containment(
    resolved: &Path,
    canonical_root: &Path,
    display: &str,
) -> Result<PathBuf, PathRejection> {
    let canonical = std::fs::canonicalize(resolved)
        .map_err(|_| PathRejection::NotFound(display.to_string()))?;

    if !is_within_root(&canonical, canonical_root) {
        return Err(PathRejection::LinkEscape(display.to_string()));
    }

    if let Some(name) = canonical.file_name().and_then(|name| name.to_str())
        && is_sensitive_file_name(name)
    {
        return Err(PathRejection::SensitiveFile(name.to_string()));
    }

    Ok(canonical)
}

/// Render `path` relative to `root` with forward slashes, for results handed
/// back to sandboxed code.
pub fn relative_display(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let rendered: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if rendered.is_empty() {
        ".".to_string()
    } else {
        rendered.join("/")
    }
}

fn is_within_root(candidate: &Path, root: &Path) -> bool {
    // Path::starts_with compares whole components.
    candidate == root || candidate.starts_with(root)
}

fn is_absolute_pattern(pattern: &str) -> bool {
    if pattern.starts_with('/') || pattern.starts_with('\\') || pattern.starts_with('~') {
        return true;
    }
    matches!(pattern.as_bytes(), [drive, b':', ..] if drive.is_ascii_alphabetic())
}

fn compile_pattern(pattern: &str) -> Pattern {
    match Pattern::new(pattern) {
        Ok(compiled) => compiled,
        // Panic is acceptable thanks to the `load_patterns` test
        Err(err) => panic!("invalid sensitive-file pattern `{pattern}`: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn root() -> PathBuf {
        PathBuf::from("/repo")
    }

    #[test]
    fn load_patterns() {
        assert_eq!(SENSITIVE_MATCHERS.len(), SENSITIVE_FILE_PATTERNS.len());
    }

    #[test]
    fn resolves_relative_paths_inside_root() {
        let result = validate_path("src/lib.rs", &root());
        assert!(result.safe);
        assert_eq!(result.resolved_path, Some(PathBuf::from("/repo/src/lib.rs")));
        assert_eq!(result.error, None);
    }

    #[test]
    fn accepts_the_root_itself() {
        assert!(validate_path(".", &root()).safe);
        assert!(validate_path("/repo", &root()).safe);
    }

    #[test]
    fn rejects_parent_traversal() {
        let result = validate_path("../etc/passwd", &root());
        assert!(!result.safe);
        assert!(result.error.unwrap_or_default().contains("sandbox boundary"));

        assert!(!validate_path("src/../../etc/passwd", &root()).safe);
    }

    #[test]
    fn rejects_prefix_collision_siblings() {
        assert!(!validate_path("/repo-evil/file.txt", &root()).safe);
        assert!(!validate_path("../repo2/file.txt", &root()).safe);
    }

    #[test]
    fn rejects_absolute_paths_outside_root() {
        assert!(!validate_path("/etc/passwd", &root()).safe);
        assert!(validate_path("/repo/a/b.txt", &root()).safe);
    }

    #[test]
    fn rejects_sensitive_files_anywhere() {
        for name in [
            ".env",
            ".env.local",
            "id_rsa",
            "id_rsa.pub",
            "id_ed25519",
            "credentials.json",
            "aws_credentials",
            "server.pem",
            "tls.KEY",
            "app-secrets.yaml",
            "release.keystore",
        ] {
            let nested = format!("config/deep/{name}");
            let result = validate_path(&nested, &root());
            assert!(!result.safe, "{name} should be blocked");
            assert!(
                result.error.unwrap_or_default().contains("sensitive file"),
                "{name} should report a sensitive file"
            );
        }
    }

    #[test]
    fn allows_lookalike_but_harmless_names() {
        assert!(validate_path("environment.md", &root()).safe);
        assert!(validate_path("keyboard.rs", &root()).safe);
        assert!(validate_path("secrets", &root()).safe);
    }

    #[test]
    fn rejects_empty_and_nul_paths() {
        assert_eq!(check_path("", &root()), Err(PathRejection::Empty));
        assert_eq!(check_path("a\0b", &root()), Err(PathRejection::NulByte));
    }

    #[test]
    fn validation_is_idempotent() {
        for path in ["src/main.rs", "../x", ".env", "/repo/a"] {
            assert_eq!(validate_path(path, &root()), validate_path(path, &root()));
        }
    }

    #[test]
    fn glob_patterns_share_the_same_rules() {
        assert!(validate_glob_pattern("**/*.rs", &root()).safe);
        assert!(validate_glob_pattern("src/**/*.ts", &root()).safe);
        assert_eq!(
            check_glob_pattern("/etc/*", &root()),
            Err(PathRejection::AbsoluteGlob("/etc/*".to_string()))
        );
        assert_eq!(
            check_glob_pattern("../**/*.rs", &root()),
            Err(PathRejection::GlobTraversal("../**/*.rs".to_string()))
        );
        assert_eq!(
            check_glob_pattern("config/.env", &root()),
            Err(PathRejection::SensitiveFile(".env".to_string()))
        );
        assert!(!validate_glob_pattern("C:/Windows/*", &root()).safe);
    }

    #[test]
    fn glob_resolves_literal_prefix() {
        assert_eq!(
            check_glob_pattern("src/tools/*.rs", &root()),
            Ok(PathBuf::from("/repo/src/tools"))
        );
        assert_eq!(check_glob_pattern("*.md", &root()), Ok(PathBuf::from("/repo")));
    }

    #[test]
    fn canonical_check_catches_link_escapes() {
        let sandbox = tempfile::tempdir().expect("sandbox");
        let outside = tempfile::tempdir().expect("outside");
        let canonical_root = std::fs::canonicalize(sandbox.path()).expect("canonical root");
        std::fs::write(outside.path().join("secret.txt"), "nope").expect("write outside");
        std::fs::write(canonical_root.join("plain.txt"), "ok").expect("write inside");

        let inside = canonical_root.join("plain.txt");
        assert!(ensure_canonical_containment(&inside, &canonical_root, "plain.txt").is_ok());

        #[cfg(unix)]
        {
            let link = canonical_root.join("escape.txt");
            std::os::unix::fs::symlink(outside.path().join("secret.txt"), &link)
                .expect("symlink");
            assert_eq!(
                ensure_canonical_containment(&link, &canonical_root, "escape.txt"),
                Err(PathRejection::LinkEscape("escape.txt".to_string()))
            );

            let disguised = canonical_root.join("notes.txt");
            std::fs::write(canonical_root.join(".env"), "TOKEN=1").expect("write env");
            std::os::unix::fs::symlink(canonical_root.join(".env"), &disguised)
                .expect("symlink env");
            assert_eq!(
                ensure_canonical_containment(&disguised, &canonical_root, "notes.txt"),
                Err(PathRejection::SensitiveFile(".env".to_string()))
            );
        }
    }

    #[test]
    fn relative_display_uses_forward_slashes() {
        assert_eq!(
            relative_display(Path::new("/repo/src/lib.rs"), &root()),
            "src/lib.rs"
        );
        assert_eq!(relative_display(Path::new("/repo"), &root()), ".");
    }
}
