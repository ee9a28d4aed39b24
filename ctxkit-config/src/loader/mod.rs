use crate::constants::{DEFAULT_CONFIG_FILE_NAME, env, memory};
use crate::limits::{ExecutionLimits, SdkLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Failure while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Environment variable {name} must be a positive integer, got '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] anyhow::Error),
}

/// Top-level configuration: execution limits plus SDK bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CtxkitConfig {
    #[serde(default)]
    pub limits: ExecutionLimits,
    #[serde(default)]
    pub sdk: SdkLimits,
}

impl CtxkitConfig {
    /// Parse configuration from TOML text without applying overrides.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Resolve the effective configuration: an explicit file if given, else
    /// `ctxkit.toml` in `search_dir` when present, else defaults. Environment
    /// overrides are applied last and the result is validated.
    pub fn load(explicit: Option<&Path>, search_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let candidate = search_dir.join(DEFAULT_CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::load_from_file(&candidate)?
                } else {
                    debug!(dir = %search_dir.display(), "No config file found; using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CTXKIT_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = read_positive(&lookup, env::TIMEOUT_MS)? {
            self.limits.timeout_ms = value;
        }
        if let Some(value) = read_positive(&lookup, env::MAX_TIMEOUT_MS)? {
            self.limits.max_timeout_ms = value;
        }
        if let Some(value) = read_positive(&lookup, env::MEMORY_LIMIT_MB)? {
            self.limits.memory_limit_bytes = value.saturating_mul(memory::BYTES_PER_MB);
        }
        if let Some(value) = read_positive(&lookup, env::MAX_OUTPUT_TOKENS)? {
            self.limits.max_output_tokens = usize::try_from(value).unwrap_or(usize::MAX);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        self.sdk.validate()?;
        Ok(())
    }
}

fn read_positive<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(value) if value > 0 => {
            debug!(variable = name, value, "Applying environment override");
            Ok(Some(value))
        }
        _ => Err(ConfigError::InvalidEnv {
            name,
            value: raw,
        }),
    }
}
