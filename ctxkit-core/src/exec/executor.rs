use super::result::{ErrorKind, ExecutionResult, ExecutionStats};
use crate::script::{ScriptError, ScriptLimits, run_script};
use crate::sdk::{CapabilityBridge, Collaborators};
use crate::security::analyze_code;
use ctxkit_commons::{estimate_tokens, sanitize_error, truncate_to_tokens};
use ctxkit_config::{CtxkitConfig, ExecutionLimits, SdkLimits};
use serde_json::Value;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Stack for the interpreter thread; sized for the call depth and nesting
/// limits.
const SCRIPT_STACK_BYTES: usize = 64 * 1024 * 1024;

type ScriptOutcome = std::thread::Result<Result<Option<Value>, ScriptError>>;

/// Per-request inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxContext {
    pub working_dir: PathBuf,
    /// Requested timeout; clamped before use.
    pub timeout_ms: Option<u64>,
    pub memory_limit_bytes: u64,
    pub max_output_tokens: usize,
}

impl SandboxContext {
    /// Context with the default memory and output limits.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let defaults = ExecutionLimits::default();
        Self {
            working_dir: working_dir.into(),
            timeout_ms: None,
            memory_limit_bytes: defaults.memory_limit_bytes,
            max_output_tokens: defaults.max_output_tokens,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Runs scripts against a fresh [`CapabilityBridge`] each time. Holds only
/// configuration and the shared read-only collaborators, so one executor
/// can serve many concurrent requests.
#[derive(Clone)]
pub struct SandboxExecutor {
    limits: ExecutionLimits,
    sdk_limits: SdkLimits,
    collaborators: Collaborators,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new(&CtxkitConfig::default())
    }
}

impl SandboxExecutor {
    pub fn new(config: &CtxkitConfig) -> Self {
        Self {
            limits: config.limits.clone(),
            sdk_limits: config.sdk.clone(),
            collaborators: Collaborators::new(&config.sdk),
        }
    }

    /// Swap the AST parser, compressors or template cache.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// A context for `working_dir` carrying this executor's limits.
    pub fn context(&self, working_dir: impl Into<PathBuf>, timeout_ms: Option<u64>) -> SandboxContext {
        SandboxContext {
            working_dir: working_dir.into(),
            timeout_ms,
            memory_limit_bytes: self.limits.memory_limit_bytes,
            max_output_tokens: self.limits.max_output_tokens,
        }
    }

    /// Vet, run and serialize one script. Never fails: every problem is
    /// reported through the returned [`ExecutionResult`].
    pub async fn execute(&self, code: &str, context: &SandboxContext) -> ExecutionResult {
        let started = Instant::now();
        let timeout = self.limits.clamp_timeout(context.timeout_ms);
        let mut result = self.execute_inner(code, context, timeout).await;
        result.stats.execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            success = result.success,
            error_kind = result.error_kind.map(ErrorKind::as_str),
            timeout_ms = timeout.as_millis() as u64,
            execution_time_ms = result.stats.execution_time_ms,
            tokens_used = result.stats.tokens_used,
            "sandbox execution finished"
        );
        result
    }

    async fn execute_inner(
        &self,
        code: &str,
        context: &SandboxContext,
        timeout: Duration,
    ) -> ExecutionResult {
        let verdict = analyze_code(code);
        for warning in &verdict.warnings {
            warn!(%warning, "security analyzer warning");
        }
        if !verdict.safe {
            warn!(blocked = ?verdict.blocked_patterns, "execution blocked by security analyzer");
            let mut result = ExecutionResult::failure(
                ErrorKind::SecurityBlocked,
                "Code contains blocked patterns and was not executed".to_string(),
            );
            result.blocked_patterns = verdict.blocked_patterns;
            result.warnings = verdict.warnings;
            return result;
        }

        let mut result = self.run_vetted(code, context, timeout).await;
        result.warnings = verdict.warnings;
        result
    }

    async fn run_vetted(
        &self,
        code: &str,
        context: &SandboxContext,
        timeout: Duration,
    ) -> ExecutionResult {
        let working_dir = context.working_dir.as_path();
        let sanitize = |message: &str| sanitize_error(message, working_dir);

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                return ExecutionResult::failure(ErrorKind::RuntimeError, error.to_string());
            }
        };
        let cancel = CancellationToken::new();
        // Stops the interpreter thread if this future is dropped early.
        let _cancel_on_drop = cancel.clone().drop_guard();

        let bridge = match CapabilityBridge::new(
            working_dir,
            self.sdk_limits.clone(),
            self.collaborators.clone(),
            cancel.clone(),
            runtime,
        ) {
            Ok(bridge) => bridge,
            Err(error) => {
                return ExecutionResult::failure(
                    ErrorKind::RuntimeError,
                    sanitize(&error.to_string()),
                );
            }
        };

        let limits = ScriptLimits {
            deadline: Instant::now() + timeout,
            memory_limit_bytes: usize::try_from(context.memory_limit_bytes).unwrap_or(usize::MAX),
            cancel: cancel.clone(),
        };
        let receiver = match spawn_script(code.to_string(), bridge, limits) {
            Ok(receiver) => receiver,
            Err(error) => {
                return ExecutionResult::failure(
                    ErrorKind::RuntimeError,
                    format!("failed to start script thread: {error}"),
                );
            }
        };

        let outcome = match tokio::time::timeout(timeout, receiver).await {
            Err(_) => {
                cancel.cancel();
                return timed_out(timeout);
            }
            Ok(Err(_)) => {
                error!("script thread exited without reporting a result");
                return ExecutionResult::failure(
                    ErrorKind::RuntimeError,
                    "Script execution aborted unexpectedly".to_string(),
                );
            }
            Ok(Ok(outcome)) => outcome,
        };

        match outcome {
            Err(panic) => {
                error!(panic = %panic_message(&*panic), "script thread panicked");
                ExecutionResult::failure(
                    ErrorKind::RuntimeError,
                    "Internal error while running the script".to_string(),
                )
            }
            Ok(Err(ScriptError::Timeout | ScriptError::Cancelled)) => timed_out(timeout),
            Ok(Err(script_error)) => {
                let kind = if script_error.is_path_rejection() {
                    ErrorKind::PathRejected
                } else {
                    ErrorKind::RuntimeError
                };
                ExecutionResult::failure(kind, sanitize(&script_error.to_string()))
            }
            Ok(Ok(value)) => render_output(value, context.max_output_tokens),
        }
    }
}

/// Run a script with the default executor configuration.
pub async fn execute_sandbox(code: &str, context: &SandboxContext) -> ExecutionResult {
    SandboxExecutor::default().execute(code, context).await
}

fn spawn_script(
    code: String,
    bridge: CapabilityBridge,
    limits: ScriptLimits,
) -> std::io::Result<oneshot::Receiver<ScriptOutcome>> {
    let (sender, receiver) = oneshot::channel();
    std::thread::Builder::new()
        .name("ctxkit-script".to_string())
        .stack_size(SCRIPT_STACK_BYTES)
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| run_script(&code, &bridge, &limits)));
            drop(bridge);
            let _ = sender.send(outcome);
        })?;
    Ok(receiver)
}

fn timed_out(timeout: Duration) -> ExecutionResult {
    ExecutionResult::failure(
        ErrorKind::Timeout,
        format!("Execution timed out after {}ms", timeout.as_millis()),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Strings are returned verbatim, everything else as pretty JSON.
fn format_value(value: Option<Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(text)) => text,
        Some(other) => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

fn render_output(value: Option<Value>, max_output_tokens: usize) -> ExecutionResult {
    let mut output = format_value(value);
    let tokens = estimate_tokens(&output);
    let mut result = ExecutionResult {
        success: true,
        ..ExecutionResult::default()
    };
    if tokens > max_output_tokens {
        let kept = truncate_to_tokens(&output, max_output_tokens).len();
        output.truncate(kept);
        output.push_str(&format!(
            "\n\n[Output truncated: {tokens} tokens exceeds limit of {max_output_tokens}]"
        ));
        result.truncated = true;
        result.error_kind = Some(ErrorKind::OutputTooLarge);
    }
    result.stats = ExecutionStats {
        execution_time_ms: 0,
        tokens_used: estimate_tokens(&output),
    };
    result.output = Some(output);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn strings_are_returned_verbatim_and_values_as_json() {
        assert_eq!(format_value(Some(json!("plain"))), "plain");
        assert_eq!(format_value(Some(json!({"a": 1}))), "{\n  \"a\": 1\n}");
        assert_eq!(format_value(None), "undefined");
    }

    #[test]
    fn oversized_output_is_truncated_with_marker() {
        let result = render_output(Some(json!("x".repeat(100))), 10);
        let output = result.output.unwrap();
        assert!(result.success);
        assert!(result.truncated);
        assert_eq!(result.error_kind, Some(ErrorKind::OutputTooLarge));
        assert!(output.starts_with(&"x".repeat(40)));
        assert!(output.ends_with("[Output truncated: 25 tokens exceeds limit of 10]"), "{output}");
    }

    #[test]
    fn output_within_limit_is_untouched() {
        let result = render_output(Some(json!(42)), 10);
        assert_eq!(result.output.as_deref(), Some("42"));
        assert!(!result.truncated);
        assert_eq!(result.stats.tokens_used, 1);
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
    }
}
