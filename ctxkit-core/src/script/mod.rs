//! Restricted interpreter for the JavaScript subset scripts are written in.
//!
//! Nothing outside the language's own values, a closed set of pure
//! built-ins and the `ctx` host object is reachable from a script. Work is
//! bounded by a deadline, a cancellation token, a live-heap estimate, the
//! call depth and the parser's nesting limit.

mod ast;
mod builtins;
mod heap;
mod interpreter;
mod lexer;
mod parser;
mod scope;
mod value;

use crate::sdk::SdkHost;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use interpreter::MAX_CALL_DEPTH;
pub use parser::MAX_NESTING;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { message: String, line: u32 },

    #[error("{name}: {message} (line {line})")]
    Runtime {
        name: String,
        message: String,
        line: u32,
    },

    /// A non-error value was thrown and never caught.
    #[error("Uncaught {0}")]
    Thrown(String),

    /// A `ctx` call failed and the script did not catch it. The message is
    /// already sanitized.
    #[error("{message}")]
    Sdk { message: String, path_rejected: bool },

    #[error("Script exceeded its time limit")]
    Timeout,

    #[error("Script was cancelled")]
    Cancelled,

    #[error("Script exceeded its memory limit of {limit} bytes")]
    MemoryLimit { limit: usize },
}

impl ScriptError {
    pub fn is_path_rejection(&self) -> bool {
        matches!(
            self,
            ScriptError::Sdk {
                path_rejected: true,
                ..
            }
        )
    }
}

/// Budgets for one run.
#[derive(Debug, Clone)]
pub struct ScriptLimits {
    pub deadline: Instant,
    pub memory_limit_bytes: usize,
    pub cancel: CancellationToken,
}

/// Parse without running.
pub fn check_syntax(source: &str) -> Result<(), ScriptError> {
    parser::parse_program(source).map(drop)
}

/// Run `source` as a function body and convert its result to JSON.
/// `Ok(None)` means the script produced `undefined` (or a function).
///
/// Runs on the calling thread; deep scripts need a generous stack.
pub fn run_script(
    source: &str,
    host: &dyn SdkHost,
    limits: &ScriptLimits,
) -> Result<Option<serde_json::Value>, ScriptError> {
    heap::reset();
    let program = parser::parse_program(source)?;
    let mut interpreter = interpreter::Interpreter::new(
        host,
        limits.deadline,
        limits.cancel.clone(),
        limits.memory_limit_bytes,
    );
    let result = interpreter.run(&program);
    let converted = match &result {
        Ok(value) => match value::to_json(value, interpreter.headroom()) {
            Ok(json) => Ok(json),
            Err(value::JsonError::TooLarge) => Err(ScriptError::MemoryLimit {
                limit: limits.memory_limit_bytes,
            }),
            Err(error) => Err(ScriptError::Runtime {
                name: "TypeError".to_string(),
                message: error.to_string(),
                line: 0,
            }),
        },
        Err(error) => Err(error.clone()),
    };
    drop(result);
    drop(interpreter);
    converted
}
