/// Wall-clock bounds for a single execution, in milliseconds.
pub mod timeouts {
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
    pub const MIN_TIMEOUT_MS: u64 = 1_000;
    pub const MAX_TIMEOUT_MS: u64 = 30_000;
}

/// Script heap and output budgets.
pub mod memory {
    pub const BYTES_PER_MB: u64 = 1024 * 1024;
    pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 128 * BYTES_PER_MB;
    pub const MIN_MEMORY_LIMIT_BYTES: u64 = BYTES_PER_MB;
    pub const MAX_MEMORY_LIMIT_BYTES: u64 = 1024 * BYTES_PER_MB;
    pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 4_000;
}

/// Bounds applied by the capability SDK.
pub mod sdk {
    pub const DEFAULT_MAX_FILES: usize = 1_000;
    pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;
    pub const DEFAULT_MAX_TRAVERSAL_DEPTH: usize = 5;
    pub const MAX_TRAVERSAL_DEPTH_CEILING: usize = 5;
    pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 100;
    pub const DEFAULT_TEMPLATE_TTL_SECS: u64 = 60;
}

/// Environment variables that override file configuration.
pub mod env {
    pub const TIMEOUT_MS: &str = "CTXKIT_TIMEOUT_MS";
    pub const MAX_TIMEOUT_MS: &str = "CTXKIT_MAX_TIMEOUT_MS";
    pub const MEMORY_LIMIT_MB: &str = "CTXKIT_MEMORY_LIMIT_MB";
    pub const MAX_OUTPUT_TOKENS: &str = "CTXKIT_MAX_OUTPUT_TOKENS";
}

/// Config file looked up in the current directory when no path is given.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "ctxkit.toml";
