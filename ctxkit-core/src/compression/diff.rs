//! Diff compression: headers and changed lines only.

use super::Compressor;
use anyhow::Result;

/// Drops context lines and index metadata from unified diffs and prefixes a
/// change summary.
pub struct DiffCompressor;

impl Compressor for DiffCompressor {
    fn compress(&self, content: &str) -> Result<String> {
        let mut files = 0usize;
        let mut added = 0usize;
        let mut removed = 0usize;
        let mut kept = Vec::new();

        for line in content.lines() {
            if line.starts_with("diff --git") {
                files += 1;
                kept.push(line);
            } else if line.starts_with("+++") || line.starts_with("---") || line.starts_with("@@") {
                kept.push(line);
            } else if line.starts_with("Binary files") || line.starts_with("rename ") {
                kept.push(line);
            } else if line.starts_with('+') {
                added += 1;
                kept.push(line);
            } else if line.starts_with('-') {
                removed += 1;
                kept.push(line);
            }
        }

        if files == 0 {
            files = kept.iter().filter(|line| line.starts_with("+++")).count();
        }
        let mut output = format!("{files} file(s) changed, +{added} -{removed}\n");
        output.push_str(&kept.join("\n"));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_headers_and_changes() {
        let input = "diff --git a/src/lib.rs b/src/lib.rs\nindex 123..456 100644\n--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,4 +1,4 @@\n context one\n-old line\n+new line\n context two\n";
        let output = DiffCompressor.compress(input).expect("compress");
        assert_eq!(
            output,
            "1 file(s) changed, +1 -1\ndiff --git a/src/lib.rs b/src/lib.rs\n--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,4 +1,4 @@\n-old line\n+new line"
        );
    }
}
