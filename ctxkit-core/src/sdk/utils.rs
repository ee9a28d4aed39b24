//! Pure helpers under `ctx.utils`.

use super::SdkError;
use super::args::Args;
use crate::compression::ContentType;
use crate::tree_sitter::LanguageSupport;
use ctxkit_commons::estimate_tokens;
use serde_json::Value;

pub(super) fn count_tokens(args: &Args) -> Result<Value, SdkError> {
    let text = args.string(0, "text")?;
    Ok(Value::from(estimate_tokens(text)))
}

pub(super) fn detect_type(args: &Args) -> Result<Value, SdkError> {
    let content = args.string(0, "content")?;
    Ok(Value::String(ContentType::detect(content).as_str().to_string()))
}

/// Language for a path or name, `null` when unknown.
pub(super) fn detect_language(args: &Args) -> Result<Value, SdkError> {
    let name = args.string(0, "pathOrName")?;
    Ok(LanguageSupport::from_name(name)
        .map(|language| Value::String(language.as_str().to_string()))
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkFunction;
    use serde_json::json;

    fn run(function: fn(&Args) -> Result<Value, SdkError>, sdk: SdkFunction, arg: &str) -> Value {
        function(&Args::new(sdk, vec![json!(arg)])).unwrap()
    }

    #[test]
    fn count_tokens_rounds_up_quarter_bytes() {
        assert_eq!(run(count_tokens, SdkFunction::UtilsCountTokens, "hello world"), json!(3));
        assert_eq!(run(count_tokens, SdkFunction::UtilsCountTokens, ""), json!(0));
    }

    #[test]
    fn detect_type_recognises_diffs() {
        let diff = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(run(detect_type, SdkFunction::UtilsDetectType, diff), json!("diff"));
    }

    #[test]
    fn detect_language_accepts_paths_and_names() {
        assert_eq!(
            run(detect_language, SdkFunction::UtilsDetectLanguage, "src/main.rs"),
            json!("rust")
        );
        assert_eq!(
            run(detect_language, SdkFunction::UtilsDetectLanguage, "TypeScript"),
            json!("typescript")
        );
        assert_eq!(
            run(detect_language, SdkFunction::UtilsDetectLanguage, "notes.txt"),
            Value::Null
        );
    }
}
