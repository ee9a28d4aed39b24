//! Bounded directory walks shared by `files`, `search`, `analyze` and
//! `pipeline`.

use super::{CapabilityBridge, SdkError};
use ctxkit_commons::{ensure_canonical_containment, is_sensitive_file_name, relative_display};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entries visited before a walk gives up, whatever the caller's limit.
pub(super) const WALK_ENTRY_LIMIT: usize = 100_000;
const CANCEL_CHECK_INTERVAL: usize = 256;
/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// A file found by a walk.
#[derive(Debug, Clone)]
pub(super) struct WalkedFile {
    pub path: PathBuf,
    /// Root-relative, forward slashes.
    pub relative: String,
    pub size: u64,
}

#[derive(Debug, Default)]
pub(super) struct WalkOutcome {
    pub files: Vec<WalkedFile>,
    pub truncated: bool,
}

impl CapabilityBridge {
    /// Collect up to `limit` files beneath `base` whose relative path passes
    /// `keep`, in file-name order. Hidden, git-ignored and sensitive files
    /// are skipped and links below `base` are not followed. `base` itself
    /// must resolve inside the root, since a walker always descends into a
    /// linked starting directory.
    pub(super) fn walk_files(
        &self,
        base: &Path,
        max_depth: Option<usize>,
        limit: usize,
        mut keep: impl FnMut(&str) -> bool,
    ) -> Result<WalkOutcome, SdkError> {
        let mut outcome = WalkOutcome::default();
        if !base.exists() {
            return Ok(outcome);
        }
        let display = relative_display(base, &self.root);
        ensure_canonical_containment(base, &self.root, &display)?;

        let walker = WalkBuilder::new(base)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(false)
            .require_git(false)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for (visited, entry) in walker.enumerate() {
            if visited % CANCEL_CHECK_INTERVAL == 0 && self.cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }
            if visited >= WALK_ENTRY_LIMIT {
                outcome.truncated = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    debug!(%error, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if is_sensitive_file_name(&name) {
                continue;
            }

            let relative = relative_display(entry.path(), &self.root);
            if !keep(&relative) {
                continue;
            }
            if outcome.files.len() >= limit {
                outcome.truncated = true;
                break;
            }
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            outcome.files.push(WalkedFile {
                path: entry.into_path(),
                relative,
                size,
            });
        }
        Ok(outcome)
    }

    /// Contents of a walked file, or `None` when it is too large, binary,
    /// unreadable or resolves outside the root.
    pub(super) fn read_walked(&self, file: &WalkedFile) -> Option<String> {
        if file.size > self.limits.max_file_size_bytes {
            return None;
        }
        let canonical = match ensure_canonical_containment(&file.path, &self.root, &file.relative) {
            Ok(canonical) => canonical,
            Err(error) => {
                debug!(path = %file.relative, %error, "skipping file outside the sandbox");
                return None;
            }
        };
        let bytes = std::fs::read(canonical).ok()?;
        if is_binary(&bytes) {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub(super) fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|byte| *byte == 0)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn nul_bytes_mark_binary() {
        assert!(is_binary(b"abc\0def"));
        assert!(!is_binary("plain text\n".as_bytes()));
    }

    #[cfg(unix)]
    #[test]
    fn linked_base_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("host.txt"), "TOPSECRET").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let bridge = bridge(dir.path());

        let error = bridge
            .walk_files(&bridge.root().join("link"), None, 10, |_| true)
            .unwrap_err();
        assert!(error.is_path_rejection(), "{error}");
    }

    #[cfg(unix)]
    #[test]
    fn walked_files_resolving_outside_root_are_not_read() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("host.txt"), "TOPSECRET").unwrap();
        std::os::unix::fs::symlink(outside.path().join("host.txt"), dir.path().join("host.txt")).unwrap();
        let bridge = bridge(dir.path());

        let file = WalkedFile {
            path: bridge.root().join("host.txt"),
            relative: "host.txt".to_string(),
            size: 9,
        };
        assert_eq!(bridge.read_walked(&file), None);
    }
}
