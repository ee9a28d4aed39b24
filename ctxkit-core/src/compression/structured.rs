use super::Compressor;
use anyhow::Result;

/// Re-serializes JSON without whitespace; falls back to collapsing
/// whitespace runs when the input does not parse.
pub struct JsonCompressor;

impl Compressor for JsonCompressor {
    fn compress(&self, content: &str) -> Result<String> {
        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(value) => Ok(serde_json::to_string(&value)?),
            Err(_) => Ok(content.split_whitespace().collect::<Vec<_>>().join(" ")),
        }
    }
}

/// Strips blank lines, trailing whitespace and whole-line comments.
pub struct CodeCompressor;

impl Compressor for CodeCompressor {
    fn compress(&self, content: &str) -> Result<String> {
        let mut in_block_comment = false;
        let mut kept = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if in_block_comment {
                if trimmed.contains("*/") {
                    in_block_comment = false;
                }
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with("//") || is_hash_comment(trimmed) {
                continue;
            }
            if trimmed.starts_with("/*") {
                in_block_comment = !trimmed.contains("*/");
                continue;
            }
            kept.push(line.trim_end());
        }
        Ok(kept.join("\n"))
    }
}

fn is_hash_comment(trimmed: &str) -> bool {
    trimmed.starts_with("# ") || trimmed == "#"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_drops_comments_and_blank_lines() {
        let input = "// header\nfn main() {\n\n    /* block\n       comment */\n    run(); \n}\n";
        let output = CodeCompressor.compress(input).expect("compress");
        assert_eq!(output, "fn main() {\n    run();\n}");
    }

    #[test]
    fn json_minifies() {
        let output = JsonCompressor.compress("{\n  \"a\": [1, 2]\n}").expect("compress");
        assert_eq!(output, "{\"a\":[1,2]}");
    }
}
