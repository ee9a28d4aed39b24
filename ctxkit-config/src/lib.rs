//! Configuration for ctxkit: execution limits, SDK bounds and the loader that
//! resolves them from TOML and `CTXKIT_*` environment variables.

pub mod constants;
pub mod limits;
pub mod loader;

pub use limits::{ExecutionLimits, SdkLimits};
pub use loader::{ConfigError, CtxkitConfig};
