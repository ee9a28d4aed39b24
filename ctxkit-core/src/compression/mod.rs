//! Compressor collaborator.
//!
//! The SDK talks to a [`CompressorRegistry`]; each [`ContentType`] maps to a
//! [`Compressor`]. The bundled compressors are heuristic and line-oriented;
//! callers can register stronger ones per content type.

mod diff;
mod logs;
mod semantic;
mod structured;

pub use diff::DiffCompressor;
pub use logs::LogCompressor;
pub use semantic::SemanticCompressor;
pub use structured::{CodeCompressor, JsonCompressor};

use anyhow::{Result, ensure};
use ctxkit_commons::estimate_tokens;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Allowed range for semantic compression ratios.
pub const MIN_RATIO: f64 = 0.1;
pub const MAX_RATIO: f64 = 0.9;
pub const DEFAULT_RATIO: f64 = 0.5;

/// Coarse classification of text handed to the compressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Logs,
    Diff,
    Code,
    Json,
    Markdown,
    Text,
}

static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(
        r"^\s*(?:\[?\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}|\[?\d{2}:\d{2}:\d{2}|\[?(?:TRACE|DEBUG|INFO|WARN|WARNING|ERROR|FATAL)\b)",
    )
});

static CODE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(
        r"^\s*(?:(?:pub\s+)?fn\s|function\s|def\s|class\s|import\s|from\s\S+\simport|export\s|const\s|let\s|var\s|return\b|if\s*\(|for\s*\(|package\s|func\s|use\s|#include|public\s|private\s)|[;{}]\s*$",
    )
});

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Logs => "logs",
            ContentType::Diff => "diff",
            ContentType::Code => "code",
            ContentType::Json => "json",
            ContentType::Markdown => "markdown",
            ContentType::Text => "text",
        }
    }

    /// Classify `content` by its dominant line shape.
    pub fn detect(content: &str) -> Self {
        let trimmed = content.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(content).is_ok()
        {
            return ContentType::Json;
        }

        let lines: Vec<&str> = content.lines().filter(|line| !line.trim().is_empty()).collect();
        if lines.is_empty() {
            return ContentType::Text;
        }

        let has_hunk = lines.iter().any(|line| line.starts_with("@@"));
        let has_file_header = lines
            .iter()
            .any(|line| line.starts_with("diff --git") || line.starts_with("+++ "));
        if has_hunk && has_file_header {
            return ContentType::Diff;
        }

        let share = |count: usize| count * 10 >= lines.len() * 3;
        if share(lines.iter().filter(|line| LOG_LINE.is_match(line)).count()) {
            return ContentType::Logs;
        }

        let markdown = lines
            .iter()
            .filter(|line| {
                let line = line.trim_start();
                line.starts_with("# ")
                    || line.starts_with("## ")
                    || line.starts_with("### ")
                    || line.starts_with("```")
                    || line.starts_with("- [")
            })
            .count();
        if markdown > 0 && lines.iter().any(|line| line.trim_start().starts_with('#')) {
            return ContentType::Markdown;
        }

        if share(lines.iter().filter(|line| CODE_LINE.is_match(line)).count()) {
            return ContentType::Code;
        }

        ContentType::Text
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content compressor for one content type.
pub trait Compressor: Send + Sync {
    fn compress(&self, content: &str) -> Result<String>;
}

/// Output of every compression entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    pub content: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
}

/// Compressors keyed by content type.
pub struct CompressorRegistry {
    compressors: HashMap<ContentType, Arc<dyn Compressor>>,
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            compressors: HashMap::new(),
        };
        registry.register(ContentType::Logs, Arc::new(LogCompressor::default()));
        registry.register(ContentType::Diff, Arc::new(DiffCompressor));
        registry.register(ContentType::Code, Arc::new(CodeCompressor));
        registry.register(ContentType::Json, Arc::new(JsonCompressor));
        registry.register(
            ContentType::Markdown,
            Arc::new(SemanticCompressor::new(DEFAULT_RATIO)),
        );
        registry.register(
            ContentType::Text,
            Arc::new(SemanticCompressor::new(DEFAULT_RATIO)),
        );
        registry
    }
}

impl CompressorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the compressor used for `content_type`.
    pub fn register(&mut self, content_type: ContentType, compressor: Arc<dyn Compressor>) {
        self.compressors.insert(content_type, compressor);
    }

    /// Detect the content type and compress accordingly.
    pub fn auto(&self, content: &str) -> Result<CompressionResult> {
        self.compress_as(ContentType::detect(content), content)
    }

    pub fn compress_as(&self, content_type: ContentType, content: &str) -> Result<CompressionResult> {
        let compressed = match self.compressors.get(&content_type) {
            Some(compressor) => compressor.compress(content)?,
            None => content.to_string(),
        };
        Ok(result(content, compressed, content_type))
    }

    /// Keep roughly `ratio` of the most informative lines.
    pub fn semantic(&self, content: &str, ratio: f64) -> Result<CompressionResult> {
        ensure!(
            (MIN_RATIO..=MAX_RATIO).contains(&ratio),
            "ratio must be between {MIN_RATIO} and {MAX_RATIO}, got {ratio}"
        );
        let compressed = SemanticCompressor::new(ratio).compress(content)?;
        Ok(result(content, compressed, ContentType::detect(content)))
    }
}

fn result(original: &str, compressed: String, content_type: ContentType) -> CompressionResult {
    // Never hand back something larger than the input.
    let compressed = if compressed.len() > original.len() {
        original.to_string()
    } else {
        compressed
    };
    CompressionResult {
        original_tokens: estimate_tokens(original),
        compressed_tokens: estimate_tokens(&compressed),
        content: compressed,
        content_type,
    }
}

pub(crate) fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Panic is acceptable thanks to the `load_patterns` test
        Err(err) => panic!("invalid compression pattern `{pattern}`: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_patterns() {
        let _ = LOG_LINE.is_match("");
        let _ = CODE_LINE.is_match("");
    }

    #[test]
    fn detects_content_types() {
        assert_eq!(ContentType::detect(r#"{"a": [1, 2]}"#), ContentType::Json);
        assert_eq!(
            ContentType::detect("diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n"),
            ContentType::Diff
        );
        assert_eq!(
            ContentType::detect(
                "2024-01-01 10:00:00 INFO start\n2024-01-01 10:00:01 ERROR boom\nplain\n"
            ),
            ContentType::Logs
        );
        assert_eq!(
            ContentType::detect("# Title\n\nSome prose here.\n\n## Section\n- item\n"),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::detect("fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n"),
            ContentType::Code
        );
        assert_eq!(
            ContentType::detect("just a sentence about nothing in particular"),
            ContentType::Text
        );
    }

    #[test]
    fn auto_reports_token_counts() {
        let registry = CompressorRegistry::new();
        let logs = "INFO ping\n".repeat(50);
        let result = registry.auto(&logs).expect("compress");
        assert_eq!(result.content_type, ContentType::Logs);
        assert!(result.compressed_tokens < result.original_tokens);
        assert_eq!(result.original_tokens, estimate_tokens(&logs));
    }

    #[test]
    fn semantic_validates_ratio() {
        let registry = CompressorRegistry::new();
        assert!(registry.semantic("text", 0.05).is_err());
        assert!(registry.semantic("text", 0.95).is_err());
        assert!(registry.semantic("text", 0.5).is_ok());
    }

    #[test]
    fn serializes_with_type_field() {
        let registry = CompressorRegistry::new();
        let value = serde_json::to_value(registry.auto("{\"a\": 1}").expect("json")).expect("ser");
        assert_eq!(value["type"], "json");
        assert_eq!(value["content"], "{\"a\":1}");
        assert!(value["originalTokens"].as_u64().is_some());
    }
}
