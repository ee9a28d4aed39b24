//! Resource-bounded execution of submitted scripts.
//!
//! A request is vetted by the security analyzer, then run by the restricted
//! interpreter on a dedicated thread against a fresh capability bridge.
//! Wall-clock time is enforced with a cancellation token the interpreter and
//! bridge both observe; memory, call depth and nesting are bounded by the
//! interpreter itself. Every error leaving this module is sanitized.
//!
//! # Example
//!
//! ```ignore
//! let executor = SandboxExecutor::default();
//! let context = executor.context("/workspace", Some(2_000));
//! let result = executor
//!     .execute("const files = ctx.files.glob('**/*.rs'); files.length", &context)
//!     .await;
//! assert!(result.success);
//! ```

mod executor;
mod result;

pub use executor::{SandboxContext, SandboxExecutor, execute_sandbox};
pub use result::{ErrorKind, ExecutionResult, ExecutionStats};
