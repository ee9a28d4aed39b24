use super::args::Args;
use super::{CapabilityBridge, SdkError};
use crate::tree_sitter::{LanguageSupport, ParsedFile, extract_symbol, render_skeleton};
use serde_json::{Value, json};
use std::path::Path;

/// Language of a file, judged by its extension only.
pub(super) fn language_for_path(path: &str) -> Option<LanguageSupport> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(LanguageSupport::from_extension)
}

fn supported_list() -> String {
    LanguageSupport::ALL
        .iter()
        .map(|language| language.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl CapabilityBridge {
    /// Resolve a language name, file name or extension the parser accepts.
    pub(super) fn resolve_language(&self, requested: &str) -> Result<LanguageSupport, SdkError> {
        LanguageSupport::from_name(requested)
            .filter(|language| self.collaborators.parser.supports(*language))
            .ok_or_else(|| SdkError::UnsupportedLanguage {
                requested: requested.to_string(),
                supported: supported_list(),
            })
    }

    pub(super) fn parse_source(&self, content: &str, language: LanguageSupport) -> Result<ParsedFile, SdkError> {
        Ok(self.collaborators.parser.parse(content, language)?)
    }

    fn parse_args(&self, args: &Args) -> Result<(String, ParsedFile), SdkError> {
        let content = args.string(0, "content")?;
        let language = self.resolve_language(args.string(1, "language")?)?;
        let parsed = self.parse_source(content, language)?;
        Ok((content.to_string(), parsed))
    }

    pub(super) fn code_parse(&self, args: &Args) -> Result<Value, SdkError> {
        let (_, parsed) = self.parse_args(args)?;
        serde_json::to_value(parsed).map_err(|error| SdkError::Other(error.into()))
    }

    /// Declaration text of one symbol, or `null` when it is not declared.
    pub(super) fn code_extract(&self, args: &Args) -> Result<Value, SdkError> {
        let (content, parsed) = self.parse_args(args)?;
        let name = args.string(2, "name")?;
        let Some(symbol) = parsed.find_symbol(name) else {
            return Ok(Value::Null);
        };
        let text = extract_symbol(&parsed, &content, name).unwrap_or_default();
        Ok(json!({
            "name": symbol.name,
            "kind": symbol.kind,
            "line": symbol.line,
            "endLine": symbol.end_line,
            "content": text,
        }))
    }

    pub(super) fn code_skeleton(&self, args: &Args) -> Result<Value, SdkError> {
        let (_, parsed) = self.parse_args(args)?;
        Ok(Value::String(render_skeleton(&parsed)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::SdkFunction;
    use super::super::test_support::*;
    use super::*;
    use crate::sdk::SdkHost;

    const SOURCE: &str = "def load(path):\n    return open(path).read()\n\nclass Store:\n    def get(self, key):\n        return key\n";

    #[test]
    fn parse_lists_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        let parsed = call(&bridge, SdkFunction::CodeParse, vec![json!(SOURCE), json!("python")]);
        let names: Vec<&str> = parsed["symbols"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|symbol| symbol["name"].as_str())
            .collect();
        assert!(names.contains(&"load"), "{names:?}");
        assert!(names.contains(&"Store"), "{names:?}");
        assert_eq!(parsed["language"], json!("python"));
    }

    #[test]
    fn extract_returns_declaration_or_null() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        let found = call(
            &bridge,
            SdkFunction::CodeExtract,
            vec![json!(SOURCE), json!("store.py"), json!("load")],
        );
        assert_eq!(found["content"], json!("def load(path):\n    return open(path).read()"));
        assert_eq!(found["line"], json!(1));
        let missing = call(
            &bridge,
            SdkFunction::CodeExtract,
            vec![json!(SOURCE), json!("py"), json!("absent")],
        );
        assert_eq!(missing, Value::Null);
    }

    #[test]
    fn skeleton_omits_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        let skeleton = call(&bridge, SdkFunction::CodeSkeleton, vec![json!(SOURCE), json!("python")]);
        let text = skeleton.as_str().unwrap();
        assert!(text.contains("def load(path)"), "{text}");
        assert!(!text.contains("open(path)"), "{text}");
    }

    #[test]
    fn unsupported_languages_name_the_alternatives() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        let error = bridge
            .call(SdkFunction::CodeParse, vec![json!("x"), json!("cobol")])
            .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("Unsupported language 'cobol'"), "{message}");
        assert!(message.contains("typescript, javascript, python, rust, go, java"), "{message}");
    }

    #[test]
    fn paths_map_to_languages_by_extension() {
        assert_eq!(language_for_path("src/main.rs"), Some(LanguageSupport::Rust));
        assert_eq!(language_for_path("web/App.TSX"), Some(LanguageSupport::TypeScript));
        assert_eq!(language_for_path("rust"), None);
    }
}
