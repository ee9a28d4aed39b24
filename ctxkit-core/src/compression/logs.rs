//! Log compression: collapse repeated lines, keep every error and warning.

use super::{Compressor, compile_regex};
use anyhow::Result;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?|\b\d{2}:\d{2}:\d{2}(?:[.,]\d+)?\b",
    )
});

static VOLATILE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\b0x[0-9a-fA-F]+\b|\b[0-9a-fA-F]{8,}\b|\b\d+\b"));

static SEVERE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"(?i)\b(?:error|fatal|panic|exception|fail(?:ed|ure)?|warn(?:ing)?)\b")
});

/// Groups lines that differ only in timestamps, ids and numbers.
pub struct LogCompressor {
    /// Groups beyond this many are summarized, except severe ones.
    pub max_groups: usize,
}

impl Default for LogCompressor {
    fn default() -> Self {
        Self { max_groups: 200 }
    }
}

struct Group<'a> {
    first: &'a str,
    count: usize,
    severe: bool,
}

impl Compressor for LogCompressor {
    fn compress(&self, content: &str) -> Result<String> {
        let mut groups: IndexMap<String, Group<'_>> = IndexMap::new();
        for line in content.lines() {
            let trimmed = line.trim_end();
            if trimmed.trim().is_empty() {
                continue;
            }
            let key = normalize(trimmed);
            groups
                .entry(key)
                .and_modify(|group| group.count += 1)
                .or_insert_with(|| Group {
                    first: trimmed,
                    count: 1,
                    severe: SEVERE.is_match(trimmed),
                });
        }

        let total = groups.len();
        let mut omitted = 0usize;
        let mut kept = 0usize;
        let mut output = Vec::with_capacity(total.min(self.max_groups) + 1);
        for group in groups.values() {
            if kept >= self.max_groups && !group.severe {
                omitted += group.count;
                continue;
            }
            kept += 1;
            if group.count > 1 {
                output.push(format!("{} (x{})", group.first, group.count));
            } else {
                output.push(group.first.to_string());
            }
        }
        if omitted > 0 {
            output.push(format!("[... {omitted} similar lines omitted]"));
        }
        Ok(output.join("\n"))
    }
}

fn normalize(line: &str) -> String {
    let without_time = TIMESTAMP.replace_all(line, "<ts>");
    VOLATILE.replace_all(&without_time, "<n>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_lines_that_differ_in_numbers() {
        let input = "2024-01-01 10:00:00 INFO request 1 ok\n2024-01-01 10:00:01 INFO request 2 ok\n2024-01-01 10:00:02 ERROR db down\n";
        let output = LogCompressor::default().compress(input).expect("compress");
        assert_eq!(
            output,
            "2024-01-01 10:00:00 INFO request 1 ok (x2)\n2024-01-01 10:00:02 ERROR db down"
        );
    }

    #[test]
    fn keeps_severe_lines_past_the_group_cap() {
        let mut input = String::new();
        for i in 0..5 {
            input.push_str(&format!("INFO unique-{}\n", ["a", "b", "c", "d", "e"][i]));
        }
        input.push_str("ERROR final failure\n");
        let compressor = LogCompressor { max_groups: 2 };
        let output = compressor.compress(&input).expect("compress");
        assert!(output.contains("ERROR final failure"));
        assert!(output.contains("[... 3 similar lines omitted]"));
    }
}
