use serde::Serialize;
use std::fmt;

/// Why an execution did not produce a clean result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SecurityBlocked,
    PathRejected,
    Timeout,
    RuntimeError,
    /// Non-fatal: the output was cut to the token limit.
    OutputTooLarge,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SecurityBlocked => "SecurityBlocked",
            ErrorKind::PathRejected => "PathRejected",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::OutputTooLarge => "OutputTooLarge",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub execution_time_ms: u64,
    pub tokens_used: usize,
}

/// Outcome of one sandboxed execution, ready to serialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    pub(super) fn failure(kind: ErrorKind, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            error_kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.success
    }

    /// Text handed back to the caller: the output on success, the error
    /// otherwise.
    pub fn display_text(&self) -> String {
        if self.success {
            return self.output.clone().unwrap_or_default();
        }
        let mut text = format!(
            "{}: {}",
            self.error_kind.unwrap_or(ErrorKind::RuntimeError),
            self.error.as_deref().unwrap_or("execution failed")
        );
        for pattern in &self.blocked_patterns {
            text.push_str("\n- ");
            text.push_str(pattern);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_in_camel_case_and_omits_empty_fields() {
        let result = ExecutionResult {
            success: true,
            output: Some("42".into()),
            stats: ExecutionStats {
                execution_time_ms: 3,
                tokens_used: 1,
            },
            ..ExecutionResult::default()
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "success": true,
                "output": "42",
                "stats": {"executionTimeMs": 3, "tokensUsed": 1},
            })
        );
    }

    #[test]
    fn failures_render_kind_and_reasons() {
        let mut result = ExecutionResult::failure(
            ErrorKind::SecurityBlocked,
            "Code contains blocked patterns".into(),
        );
        result.blocked_patterns = vec!["Timer: setTimeout".into()];
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["errorKind"], json!("SecurityBlocked"));
        assert_eq!(
            result.display_text(),
            "SecurityBlocked: Code contains blocked patterns\n- Timer: setTimeout"
        );
    }
}
