//! Shared building blocks for the ctxkit crates: sandbox path containment,
//! error text sanitization and token estimation.
//!
//! Everything here is pure or touches the filesystem read-only, so the
//! executor and the SDK bridge can call it from any thread.

pub mod paths;
pub mod sanitizer;
pub mod tokens;

pub use paths::{
    PathRejection, PathValidation, SENSITIVE_FILE_PATTERNS, canonicalize_workspace, check_glob_pattern,
    check_path, ensure_canonical_containment, is_sensitive_file_name, normalize_path,
    relative_display, validate_glob_pattern, validate_path,
};
pub use sanitizer::{HOME_PLACEHOLDER, WORKDIR_PLACEHOLDER, redact_secrets, sanitize_error};
pub use tokens::{estimate_tokens, truncate_to_tokens};
