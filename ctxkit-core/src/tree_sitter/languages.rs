use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Languages the AST collaborator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageSupport {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
}

impl LanguageSupport {
    pub const ALL: [LanguageSupport; 6] = [
        LanguageSupport::TypeScript,
        LanguageSupport::JavaScript,
        LanguageSupport::Python,
        LanguageSupport::Rust,
        LanguageSupport::Go,
        LanguageSupport::Java,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageSupport::TypeScript => "typescript",
            LanguageSupport::JavaScript => "javascript",
            LanguageSupport::Python => "python",
            LanguageSupport::Rust => "rust",
            LanguageSupport::Go => "go",
            LanguageSupport::Java => "java",
        }
    }

    /// Resolve a language name, alias, file name or bare extension.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }
        if let Some(language) = Self::from_alias(&lower) {
            return Some(language);
        }
        Path::new(&lower)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Resolve from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Some(LanguageSupport::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(LanguageSupport::JavaScript),
            "py" | "pyi" => Some(LanguageSupport::Python),
            "rs" => Some(LanguageSupport::Rust),
            "go" => Some(LanguageSupport::Go),
            "java" => Some(LanguageSupport::Java),
            _ => None,
        }
    }

    fn from_alias(lower: &str) -> Option<Self> {
        match lower {
            "typescript" => Some(LanguageSupport::TypeScript),
            "javascript" | "node" => Some(LanguageSupport::JavaScript),
            "python" | "python3" => Some(LanguageSupport::Python),
            "rust" => Some(LanguageSupport::Rust),
            "golang" => Some(LanguageSupport::Go),
            other => Self::from_extension(other),
        }
    }

    pub(crate) fn grammar(self) -> tree_sitter::Language {
        match self {
            LanguageSupport::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            LanguageSupport::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            LanguageSupport::Python => tree_sitter_python::LANGUAGE.into(),
            LanguageSupport::Rust => tree_sitter_rust::LANGUAGE.into(),
            LanguageSupport::Go => tree_sitter_go::LANGUAGE.into(),
            LanguageSupport::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }
}

impl fmt::Display for LanguageSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Type,
    Constant,
    Module,
}

impl SymbolKind {
    /// Kinds whose declarations scope nested symbols.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Module
        )
    }

    pub fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

/// How a symbol's name is found on its declaration node.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NameSource {
    /// A named field, usually `name`.
    Field(&'static str),
    /// `variable_declarator` whose value is a function expression.
    FunctionBinding,
}

/// Declaration node kind mapped to a symbol kind.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SymbolPattern {
    pub node_kind: &'static str,
    pub kind: SymbolKind,
    pub name: NameSource,
}

const fn pattern(node_kind: &'static str, kind: SymbolKind) -> SymbolPattern {
    SymbolPattern {
        node_kind,
        kind,
        name: NameSource::Field("name"),
    }
}

/// Node kinds per language that carry the language-specific bits of extraction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LanguagePatterns {
    pub symbols: &'static [SymbolPattern],
    /// Node kinds whose text (or `source`/`path` field) names an import.
    pub imports: &'static [&'static str],
    /// Call node kind and the field holding the callee.
    pub calls: &'static [(&'static str, &'static str)],
    /// Scope node that re-parents methods without declaring a symbol itself
    /// (`impl` blocks), with the field holding the owner's name.
    pub scope_only: Option<(&'static str, &'static str)>,
}

const RUST_SYMBOLS: &[SymbolPattern] = &[
    pattern("function_item", SymbolKind::Function),
    pattern("function_signature_item", SymbolKind::Function),
    pattern("struct_item", SymbolKind::Struct),
    pattern("enum_item", SymbolKind::Enum),
    pattern("trait_item", SymbolKind::Trait),
    pattern("type_item", SymbolKind::Type),
    pattern("const_item", SymbolKind::Constant),
    pattern("static_item", SymbolKind::Constant),
    pattern("mod_item", SymbolKind::Module),
];

const PYTHON_SYMBOLS: &[SymbolPattern] = &[
    pattern("function_definition", SymbolKind::Function),
    pattern("class_definition", SymbolKind::Class),
];

const JAVASCRIPT_SYMBOLS: &[SymbolPattern] = &[
    pattern("function_declaration", SymbolKind::Function),
    pattern("generator_function_declaration", SymbolKind::Function),
    pattern("class_declaration", SymbolKind::Class),
    pattern("method_definition", SymbolKind::Method),
    SymbolPattern {
        node_kind: "variable_declarator",
        kind: SymbolKind::Function,
        name: NameSource::FunctionBinding,
    },
];

const TYPESCRIPT_SYMBOLS: &[SymbolPattern] = &[
    pattern("function_declaration", SymbolKind::Function),
    pattern("generator_function_declaration", SymbolKind::Function),
    pattern("class_declaration", SymbolKind::Class),
    pattern("abstract_class_declaration", SymbolKind::Class),
    pattern("method_definition", SymbolKind::Method),
    pattern("interface_declaration", SymbolKind::Interface),
    pattern("type_alias_declaration", SymbolKind::Type),
    pattern("enum_declaration", SymbolKind::Enum),
    SymbolPattern {
        node_kind: "variable_declarator",
        kind: SymbolKind::Function,
        name: NameSource::FunctionBinding,
    },
];

const GO_SYMBOLS: &[SymbolPattern] = &[
    pattern("function_declaration", SymbolKind::Function),
    pattern("method_declaration", SymbolKind::Method),
    pattern("type_spec", SymbolKind::Type),
    pattern("const_spec", SymbolKind::Constant),
];

const JAVA_SYMBOLS: &[SymbolPattern] = &[
    pattern("class_declaration", SymbolKind::Class),
    pattern("interface_declaration", SymbolKind::Interface),
    pattern("enum_declaration", SymbolKind::Enum),
    pattern("record_declaration", SymbolKind::Class),
    pattern("method_declaration", SymbolKind::Method),
    pattern("constructor_declaration", SymbolKind::Method),
];

pub(crate) fn patterns_for(language: LanguageSupport) -> LanguagePatterns {
    match language {
        LanguageSupport::Rust => LanguagePatterns {
            symbols: RUST_SYMBOLS,
            imports: &["use_declaration", "extern_crate_declaration"],
            calls: &[("call_expression", "function")],
            scope_only: Some(("impl_item", "type")),
        },
        LanguageSupport::Python => LanguagePatterns {
            symbols: PYTHON_SYMBOLS,
            imports: &["import_statement", "import_from_statement"],
            calls: &[("call", "function")],
            scope_only: None,
        },
        LanguageSupport::JavaScript => LanguagePatterns {
            symbols: JAVASCRIPT_SYMBOLS,
            imports: &["import_statement"],
            calls: &[("call_expression", "function")],
            scope_only: None,
        },
        LanguageSupport::TypeScript => LanguagePatterns {
            symbols: TYPESCRIPT_SYMBOLS,
            imports: &["import_statement"],
            calls: &[("call_expression", "function")],
            scope_only: None,
        },
        LanguageSupport::Go => LanguagePatterns {
            symbols: GO_SYMBOLS,
            imports: &["import_spec"],
            calls: &[("call_expression", "function")],
            scope_only: None,
        },
        LanguageSupport::Java => LanguagePatterns {
            symbols: JAVA_SYMBOLS,
            imports: &["import_declaration"],
            calls: &[("method_invocation", "name")],
            scope_only: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_aliases_and_files() {
        assert_eq!(LanguageSupport::from_name("TypeScript"), Some(LanguageSupport::TypeScript));
        assert_eq!(LanguageSupport::from_name("ts"), Some(LanguageSupport::TypeScript));
        assert_eq!(LanguageSupport::from_name("src/lib.rs"), Some(LanguageSupport::Rust));
        assert_eq!(LanguageSupport::from_name("main.go"), Some(LanguageSupport::Go));
        assert_eq!(LanguageSupport::from_name("golang"), Some(LanguageSupport::Go));
        assert_eq!(LanguageSupport::from_name("App.java"), Some(LanguageSupport::Java));
        assert_eq!(LanguageSupport::from_name("script.py"), Some(LanguageSupport::Python));
        assert_eq!(LanguageSupport::from_name("index.mjs"), Some(LanguageSupport::JavaScript));
    }

    #[test]
    fn rejects_unknown_languages() {
        assert_eq!(LanguageSupport::from_name("cobol"), None);
        assert_eq!(LanguageSupport::from_name("notes.txt"), None);
        assert_eq!(LanguageSupport::from_name(""), None);
    }

    #[test]
    fn every_language_has_patterns() {
        for language in LanguageSupport::ALL {
            assert!(!patterns_for(language).symbols.is_empty(), "{language}");
        }
    }
}
