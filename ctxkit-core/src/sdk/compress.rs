use super::args::Args;
use super::{CapabilityBridge, SdkError, SdkFunction};
use crate::compression::{CompressionResult, ContentType, DEFAULT_RATIO, MAX_RATIO, MIN_RATIO};
use serde_json::Value;

impl CapabilityBridge {
    /// Run one of the compressors on `content`.
    pub(super) fn compress_text(
        &self,
        function: SdkFunction,
        content: &str,
        ratio: Option<f64>,
    ) -> Result<CompressionResult, SdkError> {
        let registry = &self.collaborators.compressors;
        let result = match function {
            SdkFunction::CompressLogs => registry.compress_as(ContentType::Logs, content)?,
            SdkFunction::CompressDiff => registry.compress_as(ContentType::Diff, content)?,
            SdkFunction::CompressSemantic => {
                let ratio = ratio.unwrap_or(DEFAULT_RATIO);
                if !(MIN_RATIO..=MAX_RATIO).contains(&ratio) {
                    return Err(SdkError::invalid(
                        function.name(),
                        format!("ratio must be between {MIN_RATIO} and {MAX_RATIO}, got {ratio}"),
                    ));
                }
                registry.semantic(content, ratio)?
            }
            _ => registry.auto(content)?,
        };
        Ok(result)
    }

    pub(super) fn compress(&self, args: &Args) -> Result<Value, SdkError> {
        let content = args.string(0, "content")?;
        let ratio = args.opt_f64(1, "ratio")?;
        let result = self.compress_text(args.function(), content, ratio)?;
        serde_json::to_value(result).map_err(|error| SdkError::Other(error.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::sdk::SdkHost;
    use serde_json::json;

    #[test]
    fn results_carry_type_and_token_counts() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        let logs = (0..50)
            .map(|index| format!("2024-01-01 10:00:{:02} INFO request served", index % 60))
            .collect::<Vec<_>>()
            .join("\n");
        let result = call(&bridge, SdkFunction::CompressLogs, vec![json!(logs)]);
        assert_eq!(result["type"], json!("logs"));
        let original = result["originalTokens"].as_u64().unwrap();
        let compressed = result["compressedTokens"].as_u64().unwrap();
        assert!(compressed <= original);
        assert!(result["content"].is_string());
    }

    #[test]
    fn semantic_ratio_is_range_checked() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        for ratio in [0.05, 0.95] {
            let error = bridge
                .call(SdkFunction::CompressSemantic, vec![json!("some text"), json!(ratio)])
                .unwrap_err();
            assert!(error.to_string().contains("ratio must be between"), "{error}");
        }
        let ok = call(
            &bridge,
            SdkFunction::CompressSemantic,
            vec![json!("line one\nline two\nline three"), Value::Null],
        );
        assert!(ok["compressedTokens"].is_u64());
    }
}
