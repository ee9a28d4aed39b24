//! The `code_execute` tool contract.
//!
//! Registries outside this crate advertise [`definition`] and route calls to
//! [`execute_tool`]. Failures never surface as transport errors: they come
//! back as a normal [`ToolResponse`] with `isError` set.

use crate::exec::{ExecutionResult, ExecutionStats, SandboxExecutor};
use anyhow::{Context, Result};
use ctxkit_config::constants::timeouts;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

pub const CODE_EXECUTE_TOOL: &str = "code_execute";

const DESCRIPTION: &str = "Run a short JavaScript snippet against a read-only SDK exposed as `ctx` \
(ctx.files, ctx.search, ctx.code, ctx.analyze, ctx.git, ctx.compress, ctx.pipeline, ctx.utils) and \
return only its final value. Use it to batch many lookups into one call. Paths are relative to the \
workspace; no network, timers, process or module access.";

/// Arguments accepted by the tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CodeExecuteArgs {
    pub code: String,
    /// Requested timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl CodeExecuteArgs {
    pub fn from_value(args: Value) -> Result<Self> {
        serde_json::from_value(args).with_context(|| format!("Invalid {CODE_EXECUTE_TOOL} arguments"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Serialized tool result. `stats` is kept for telemetry and never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(skip)]
    pub stats: ExecutionStats,
}

impl From<ExecutionResult> for ToolResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            content: vec![ToolContent::text(result.display_text())],
            is_error: result.is_error(),
            stats: result.stats,
        }
    }
}

/// Name, description and JSON input schema of `code_execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: CODE_EXECUTE_TOOL.to_string(),
        description: DESCRIPTION.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "JavaScript to run. The value of the last expression statement is returned; strings verbatim, everything else as JSON."},
                "timeout": {
                    "type": "number",
                    "description": "Timeout in milliseconds, clamped to the configured bounds.",
                    "minimum": timeouts::MIN_TIMEOUT_MS,
                    "maximum": timeouts::MAX_TIMEOUT_MS,
                    "default": timeouts::DEFAULT_TIMEOUT_MS
                }
            },
            "required": ["code"],
            "additionalProperties": false
        }),
    }
}

/// Run one tool call in `working_dir`. Only malformed arguments are an
/// `Err`; everything after that is reported inside the response.
pub async fn execute_tool(
    executor: &SandboxExecutor,
    working_dir: &Path,
    args: Value,
) -> Result<ToolResponse> {
    let args = CodeExecuteArgs::from_value(args)?;
    let context = executor.context(working_dir, args.timeout);
    Ok(executor.execute(&args.code, &context).await.into())
}
