use crate::constants::{memory, sdk, timeouts};
use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource bounds applied to every execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionLimits {
    /// Timeout used when a request does not ask for one.
    #[serde(default = "ExecutionLimits::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Floor that every requested timeout is raised to.
    #[serde(default = "ExecutionLimits::default_min_timeout_ms")]
    pub min_timeout_ms: u64,
    /// Ceiling that every requested timeout is lowered to.
    #[serde(default = "ExecutionLimits::default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// Estimated live script heap allowed before the run fails.
    #[serde(default = "ExecutionLimits::default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,
    /// Output beyond this many estimated tokens is truncated.
    #[serde(default = "ExecutionLimits::default_max_output_tokens")]
    pub max_output_tokens: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            min_timeout_ms: Self::default_min_timeout_ms(),
            max_timeout_ms: Self::default_max_timeout_ms(),
            memory_limit_bytes: Self::default_memory_limit_bytes(),
            max_output_tokens: Self::default_max_output_tokens(),
        }
    }
}

impl ExecutionLimits {
    const fn default_timeout_ms() -> u64 {
        timeouts::DEFAULT_TIMEOUT_MS
    }

    const fn default_min_timeout_ms() -> u64 {
        timeouts::MIN_TIMEOUT_MS
    }

    const fn default_max_timeout_ms() -> u64 {
        timeouts::MAX_TIMEOUT_MS
    }

    const fn default_memory_limit_bytes() -> u64 {
        memory::DEFAULT_MEMORY_LIMIT_BYTES
    }

    const fn default_max_output_tokens() -> usize {
        memory::DEFAULT_MAX_OUTPUT_TOKENS
    }

    /// Clamp a requested timeout into `[min_timeout_ms, max_timeout_ms]`,
    /// falling back to `timeout_ms` when nothing was requested.
    pub fn clamp_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let requested = requested_ms.unwrap_or(self.timeout_ms);
        let floor = self.min_timeout_ms.min(self.max_timeout_ms);
        Duration::from_millis(requested.clamp(floor, self.max_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.min_timeout_ms >= timeouts::MIN_TIMEOUT_MS,
            "limits.min_timeout_ms must be at least {}ms",
            timeouts::MIN_TIMEOUT_MS
        );
        ensure!(
            self.max_timeout_ms <= timeouts::MAX_TIMEOUT_MS,
            "limits.max_timeout_ms must not exceed {}ms",
            timeouts::MAX_TIMEOUT_MS
        );
        ensure!(
            self.min_timeout_ms <= self.timeout_ms && self.timeout_ms <= self.max_timeout_ms,
            "limits.timeout_ms must lie between min_timeout_ms ({}) and max_timeout_ms ({})",
            self.min_timeout_ms,
            self.max_timeout_ms
        );
        ensure!(
            (memory::MIN_MEMORY_LIMIT_BYTES..=memory::MAX_MEMORY_LIMIT_BYTES)
                .contains(&self.memory_limit_bytes),
            "limits.memory_limit_bytes must be between 1MB and 1GB"
        );
        ensure!(
            self.max_output_tokens > 0,
            "limits.max_output_tokens must be at least 1"
        );
        Ok(())
    }
}

/// Bounds applied inside the capability SDK.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SdkLimits {
    /// Maximum files any single glob, search or pipeline step considers.
    #[serde(default = "SdkLimits::default_max_files")]
    pub max_files: usize,
    /// Files larger than this are rejected before reading.
    #[serde(default = "SdkLimits::default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    /// Depth bound for directory structure and call graph traversal.
    #[serde(default = "SdkLimits::default_max_traversal_depth")]
    pub max_traversal_depth: usize,
    /// Default result count for search operations.
    #[serde(default = "SdkLimits::default_max_search_results")]
    pub max_search_results: usize,
    /// Lifetime of cached pipeline template results.
    #[serde(default = "SdkLimits::default_template_ttl_secs")]
    pub template_ttl_secs: u64,
}

impl Default for SdkLimits {
    fn default() -> Self {
        Self {
            max_files: Self::default_max_files(),
            max_file_size_bytes: Self::default_max_file_size_bytes(),
            max_traversal_depth: Self::default_max_traversal_depth(),
            max_search_results: Self::default_max_search_results(),
            template_ttl_secs: Self::default_template_ttl_secs(),
        }
    }
}

impl SdkLimits {
    const fn default_max_files() -> usize {
        sdk::DEFAULT_MAX_FILES
    }

    const fn default_max_file_size_bytes() -> u64 {
        sdk::DEFAULT_MAX_FILE_SIZE_BYTES
    }

    const fn default_max_traversal_depth() -> usize {
        sdk::DEFAULT_MAX_TRAVERSAL_DEPTH
    }

    const fn default_max_search_results() -> usize {
        sdk::DEFAULT_MAX_SEARCH_RESULTS
    }

    const fn default_template_ttl_secs() -> u64 {
        sdk::DEFAULT_TEMPLATE_TTL_SECS
    }

    pub fn template_ttl(&self) -> Duration {
        Duration::from_secs(self.template_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_files > 0, "sdk.max_files must be at least 1");
        ensure!(
            self.max_file_size_bytes > 0,
            "sdk.max_file_size_bytes must be at least 1"
        );
        ensure!(
            (1..=sdk::MAX_TRAVERSAL_DEPTH_CEILING).contains(&self.max_traversal_depth),
            "sdk.max_traversal_depth must be between 1 and {}",
            sdk::MAX_TRAVERSAL_DEPTH_CEILING
        );
        ensure!(
            self.max_search_results > 0 && self.max_search_results <= self.max_files,
            "sdk.max_search_results must be between 1 and sdk.max_files"
        );
        ensure!(
            self.template_ttl_secs > 0,
            "sdk.template_ttl_secs must be at least 1"
        );
        Ok(())
    }
}
