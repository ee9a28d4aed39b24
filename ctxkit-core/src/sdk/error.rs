use ctxkit_commons::{PathRejection, sanitize_error};
use std::path::Path;
use thiserror::Error;

/// Failure of a single `ctx.*` call.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("{0}")]
    PathRejected(#[from] PathRejection),

    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Unsupported language '{requested}'. Supported languages: {supported}")]
    UnsupportedLanguage { requested: String, supported: String },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    /// Already stripped of host paths and secrets.
    #[error("{message}")]
    Sanitized { message: String, path_rejected: bool },

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl SdkError {
    pub fn invalid(function: impl Into<String>, message: impl Into<String>) -> Self {
        SdkError::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn is_path_rejection(&self) -> bool {
        match self {
            SdkError::PathRejected(_) => true,
            SdkError::Sanitized { path_rejected, .. } => *path_rejected,
            _ => false,
        }
    }

    /// Replace the error with its sanitized form. Cancellation is kept as is
    /// so the interpreter can abort instead of surfacing a catchable error.
    pub fn sanitized(self, working_dir: &Path) -> Self {
        match self {
            SdkError::Cancelled => SdkError::Cancelled,
            SdkError::Sanitized { .. } => self,
            other => SdkError::Sanitized {
                path_rejected: other.is_path_rejection(),
                message: sanitize_error(&other.to_string(), working_dir),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sanitizing_strips_working_dir_and_keeps_kind() {
        let root = PathBuf::from("/srv/sandbox-root");
        let error = SdkError::PathRejected(PathRejection::NotFound(
            "/srv/sandbox-root/missing.txt".to_string(),
        ));
        let sanitized = error.sanitized(&root);
        assert!(sanitized.is_path_rejection());
        let message = sanitized.to_string();
        assert!(!message.contains("/srv/sandbox-root"), "{message}");
        assert!(message.contains("<workdir>/missing.txt"));
    }

    #[test]
    fn cancellation_survives_sanitizing() {
        let sanitized = SdkError::Cancelled.sanitized(Path::new("/tmp/x"));
        assert!(matches!(sanitized, SdkError::Cancelled));
    }

    #[test]
    fn anyhow_errors_render_their_chain() {
        let error: SdkError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(error.to_string(), "outer: inner");
    }
}
