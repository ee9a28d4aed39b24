//! # ctxkit-core
//!
//! Sandboxed execution of short scripts against a read-only capability SDK.
//!
//! A caller submits JavaScript through the `code_execute` tool. The script is
//! vetted by a denylist analyzer, then run by a restricted interpreter whose
//! only window onto the host is the `ctx` object. Every `ctx.*` call goes
//! through path validation rooted at the working directory, and every error
//! is sanitized before it reaches the caller.
//!
//! ## Modules
//!
//! - `security`: static denylist analysis of submissions.
//! - `script`: the restricted interpreter.
//! - `sdk`: the `ctx` capability bridge.
//! - `tree_sitter`: AST collaborator for the `code`, `search` and `analyze`
//!   namespaces.
//! - `compression`: content-type aware compressors.
//! - `exec`: the resource-bounded executor.
//! - `tool`: the `code_execute` tool contract.

pub mod compression;
pub mod exec;
pub mod script;
pub mod sdk;
pub mod security;
pub mod tool;
pub mod tree_sitter;

pub use exec::{ErrorKind, ExecutionResult, ExecutionStats, SandboxContext, SandboxExecutor, execute_sandbox};
pub use security::{SecurityVerdict, analyze_code};
pub use tool::{CODE_EXECUTE_TOOL, CodeExecuteArgs, ToolResponse, definition, execute_tool};
