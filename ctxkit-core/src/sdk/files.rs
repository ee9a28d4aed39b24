use super::args::Args;
use super::{CapabilityBridge, SdkError};
use ctxkit_commons::{PathRejection, check_glob_pattern, check_path, ensure_canonical_containment};
use glob::{MatchOptions, Pattern};
use serde_json::Value;
use std::path::PathBuf;

pub(super) const GLOB_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl CapabilityBridge {
    /// Validate `path`, resolve links and confirm the real file is still
    /// inside the sandbox.
    pub(super) fn resolve_existing(&self, path: &str) -> Result<PathBuf, SdkError> {
        let resolved = check_path(path, &self.root)?;
        Ok(ensure_canonical_containment(&resolved, &self.root, path)?)
    }

    /// Read a validated file as text, refusing directories and files above
    /// the size limit before any bytes are read.
    pub(super) fn read_text(&self, path: &str) -> Result<String, SdkError> {
        let canonical = self.resolve_existing(path)?;
        let metadata = std::fs::metadata(&canonical)
            .map_err(|_| PathRejection::NotFound(path.to_string()))?;
        if metadata.is_dir() {
            return Err(SdkError::invalid("files.read", format!("'{path}' is a directory")));
        }
        let limit = self.limits.max_file_size_bytes;
        if metadata.len() > limit {
            return Err(SdkError::invalid(
                "files.read",
                format!(
                    "File '{path}' is too large ({} bytes, limit {limit} bytes)",
                    metadata.len()
                ),
            ));
        }
        let bytes = std::fs::read(&canonical).map_err(|error| {
            SdkError::Other(anyhow::anyhow!("failed to read '{path}': {error}"))
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Files matching a glob pattern, relative to the root and sorted.
    pub(super) fn glob_paths(&self, pattern: &str, function: &str) -> Result<Vec<String>, SdkError> {
        let base = check_glob_pattern(pattern, &self.root)?;
        let trimmed = pattern.trim_start_matches("./");
        let matcher = Pattern::new(trimmed)
            .map_err(|error| SdkError::invalid(function, format!("invalid glob '{pattern}': {error}")))?;
        let outcome = self.walk_files(&base, None, self.limits.max_files, |relative| {
            matcher.matches_with(relative, GLOB_MATCH_OPTIONS)
        })?;
        let mut paths: Vec<String> = outcome.files.into_iter().map(|file| file.relative).collect();
        paths.sort();
        Ok(paths)
    }

    pub(super) fn files_read(&self, args: &Args) -> Result<Value, SdkError> {
        let path = args.string(0, "path")?;
        Ok(Value::String(self.read_text(path)?))
    }

    pub(super) fn files_exists(&self, args: &Args) -> Result<Value, SdkError> {
        let path = args.string(0, "path")?;
        match self.resolve_existing(path) {
            Ok(_) => Ok(Value::Bool(true)),
            Err(SdkError::PathRejected(PathRejection::NotFound(_))) => Ok(Value::Bool(false)),
            Err(error) => Err(error),
        }
    }

    pub(super) fn files_glob(&self, args: &Args) -> Result<Value, SdkError> {
        let pattern = args.string(0, "pattern")?;
        let paths = self.glob_paths(pattern, "files.glob")?;
        Ok(Value::Array(paths.into_iter().map(Value::String).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::SdkFunction;
    use super::super::test_support::*;
    use crate::sdk::SdkHost;
    use ctxkit_config::SdkLimits;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tokio_util::sync::CancellationToken;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn lib() {}\n").unwrap();
        fs::write(dir.path().join("src/nested/mod.rs"), "fn nested() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# readme\n").unwrap();
        fs::write(dir.path().join(".env"), "TOKEN=1\n").unwrap();
        fs::write(dir.path().join("server.pem"), "pem\n").unwrap();
        dir
    }

    #[test]
    fn read_returns_file_text() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        assert_eq!(
            call(&bridge, SdkFunction::FilesRead, vec![json!("src/lib.rs")]),
            json!("pub fn lib() {}\n")
        );
    }

    #[test]
    fn read_rejects_sensitive_and_escaping_paths() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        for path in [".env", "../outside.txt", "/etc/passwd", "server.pem"] {
            let error = bridge
                .call(SdkFunction::FilesRead, vec![json!(path)])
                .unwrap_err();
            assert!(error.is_path_rejection(), "{path}: {error}");
        }
    }

    #[test]
    fn read_rejects_oversized_files_and_directories() {
        let dir = fixture();
        fs::write(dir.path().join("big.txt"), "x".repeat(64)).unwrap();
        let limits = SdkLimits {
            max_file_size_bytes: 16,
            ..SdkLimits::default()
        };
        let bridge = bridge_with(dir.path(), limits, CancellationToken::new());
        let error = bridge
            .call(SdkFunction::FilesRead, vec![json!("big.txt")])
            .unwrap_err();
        assert!(error.to_string().contains("too large"), "{error}");
        let error = bridge
            .call(SdkFunction::FilesRead, vec![json!("src")])
            .unwrap_err();
        assert!(error.to_string().contains("is a directory"), "{error}");
    }

    #[cfg(unix)]
    #[test]
    fn read_refuses_links_out_of_the_sandbox() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let dir = fixture();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();
        let bridge = bridge(dir.path());
        let error = bridge
            .call(SdkFunction::FilesRead, vec![json!("link.txt")])
            .unwrap_err();
        assert!(error.is_path_rejection());
        assert!(error.to_string().contains("outside the sandbox"), "{error}");
    }

    #[test]
    fn exists_reports_presence() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        assert_eq!(call(&bridge, SdkFunction::FilesExists, vec![json!("README.md")]), json!(true));
        assert_eq!(call(&bridge, SdkFunction::FilesExists, vec![json!("nope.md")]), json!(false));
        assert!(bridge.call(SdkFunction::FilesExists, vec![json!(".env")]).is_err());
    }

    #[test]
    fn glob_matches_relative_paths_and_skips_sensitive_files() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        assert_eq!(
            call(&bridge, SdkFunction::FilesGlob, vec![json!("**/*.rs")]),
            json!(["src/lib.rs", "src/nested/mod.rs"])
        );
        assert_eq!(
            call(&bridge, SdkFunction::FilesGlob, vec![json!("src/*.rs")]),
            json!(["src/lib.rs"])
        );
        assert_eq!(
            call(&bridge, SdkFunction::FilesGlob, vec![json!("*")]),
            json!(["README.md"])
        );
    }

    #[test]
    fn glob_results_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..10 {
            fs::write(dir.path().join(format!("f{index}.txt")), "x").unwrap();
        }
        let limits = SdkLimits {
            max_files: 3,
            max_search_results: 3,
            ..SdkLimits::default()
        };
        let bridge = bridge_with(dir.path(), limits, CancellationToken::new());
        let found = call(&bridge, SdkFunction::FilesGlob, vec![json!("*.txt")]);
        assert_eq!(found.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn glob_rejects_traversal_and_absolute_patterns() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        for pattern in ["../**/*", "/etc/*", ".env"] {
            let error = bridge
                .call(SdkFunction::FilesGlob, vec![json!(pattern)])
                .unwrap_err();
            assert!(error.is_path_rejection(), "{pattern}: {error}");
        }
    }
}
