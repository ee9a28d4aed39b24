//! AST collaborator backed by tree-sitter grammars.
//!
//! The SDK only depends on the [`AstParser`] trait; [`TreeSitterParser`] is
//! the reference implementation shipped with the crate.

mod languages;

pub use languages::{LanguageSupport, SymbolKind};

use anyhow::{Context, Result, anyhow};
use languages::{LanguagePatterns, NameSource, patterns_for};
use serde::Serialize;
use tree_sitter::{Node, Parser};

const MAX_TREE_DEPTH: usize = 512;
const MAX_SIGNATURE_CHARS: usize = 200;

/// A declared symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-based first line.
    pub line: usize,
    /// 1-based last line.
    pub end_line: usize,
    pub signature: String,
    pub exported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip)]
    pub byte_range: (usize, usize),
}

/// An import or use declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    pub source: String,
    pub line: usize,
}

/// A call expression and the function it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    pub callee: String,
    pub line: usize,
}

/// Everything the SDK needs from one parsed source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFile {
    pub language: LanguageSupport,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    pub exports: Vec<String>,
    pub calls: Vec<CallSite>,
}

impl ParsedFile {
    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|symbol| symbol.name == name)
            .or_else(|| {
                let (owner, member) = name.rsplit_once(['.', ':'])?;
                let owner = owner.trim_end_matches(':');
                self.symbols.iter().find(|symbol| {
                    symbol.name == member && symbol.parent.as_deref() == Some(owner)
                })
            })
    }
}

/// Source parser used by `ctx.code`, `ctx.search.symbols` and `ctx.analyze`.
pub trait AstParser: Send + Sync {
    fn parse(&self, source: &str, language: LanguageSupport) -> Result<ParsedFile>;

    fn supports(&self, language: LanguageSupport) -> bool {
        let _ = language;
        true
    }
}

/// tree-sitter backed [`AstParser`]. A fresh parser is created per call so
/// the type is freely shareable across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterParser;

impl AstParser for TreeSitterParser {
    fn parse(&self, source: &str, language: LanguageSupport) -> Result<ParsedFile> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.grammar())
            .with_context(|| format!("failed to load {language} grammar"))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("failed to parse {language} source"))?;

        let mut walker = Walker {
            source,
            language,
            patterns: patterns_for(language),
            parsed: ParsedFile {
                language,
                symbols: Vec::new(),
                imports: Vec::new(),
                exports: Vec::new(),
                calls: Vec::new(),
            },
            scopes: Vec::new(),
            functions: Vec::new(),
        };
        walker.visit(tree.root_node(), 0);

        let mut parsed = walker.parsed;
        for symbol in &parsed.symbols {
            if symbol.exported && symbol.parent.is_none() && !parsed.exports.contains(&symbol.name)
            {
                parsed.exports.push(symbol.name.clone());
            }
        }
        Ok(parsed)
    }
}

struct Walker<'a> {
    source: &'a str,
    language: LanguageSupport,
    patterns: LanguagePatterns,
    parsed: ParsedFile,
    scopes: Vec<String>,
    functions: Vec<String>,
}

impl Walker<'_> {
    fn visit(&mut self, node: Node<'_>, depth: usize) {
        if depth > MAX_TREE_DEPTH {
            return;
        }
        let kind = node.kind();

        if self.patterns.imports.contains(&kind) {
            self.record_import(node);
        }
        if kind == "export_statement" {
            self.record_export_clause(node);
        }
        if let Some((_, field)) = self
            .patterns
            .calls
            .iter()
            .find(|(call_kind, _)| *call_kind == kind)
        {
            self.record_call(node, field);
        }

        let mut pushed_scope = false;
        let mut pushed_function = false;

        if let Some((scope_kind, field)) = self.patterns.scope_only
            && kind == scope_kind
            && let Some(owner) = node.child_by_field_name(field)
        {
            self.scopes.push(base_type_name(self.text(owner)));
            pushed_scope = true;
        }

        if let Some(symbol) = self.match_symbol(node) {
            if symbol.kind.is_container() {
                self.scopes.push(symbol.name.clone());
                pushed_scope = true;
            } else if symbol.kind.is_callable() {
                self.functions.push(symbol.name.clone());
                pushed_function = true;
            }
            self.parsed.symbols.push(symbol);
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, depth + 1);
        }

        if pushed_scope {
            self.scopes.pop();
        }
        if pushed_function {
            self.functions.pop();
        }
    }

    fn match_symbol(&self, node: Node<'_>) -> Option<Symbol> {
        let pattern = self
            .patterns
            .symbols
            .iter()
            .find(|pattern| pattern.node_kind == node.kind())?;

        let (name, declaration) = match pattern.name {
            NameSource::Field(field) => (self.text(node.child_by_field_name(field)?), node),
            NameSource::FunctionBinding => {
                let value = node.child_by_field_name("value")?;
                if !matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function"
                ) {
                    return None;
                }
                let declaration = node.parent().unwrap_or(node);
                (self.text(node.child_by_field_name("name")?), declaration)
            }
        };
        if name.is_empty() {
            return None;
        }

        let mut kind = pattern.kind;
        let parent = self.scopes.last().cloned();
        if kind == SymbolKind::Function && parent.is_some() {
            kind = SymbolKind::Method;
        }
        if kind == SymbolKind::Type && self.language == LanguageSupport::Go {
            kind = go_type_kind(node);
        }

        Some(Symbol {
            exported: self.is_exported(declaration, &name, parent.is_some()),
            signature: self.signature(node),
            line: declaration.start_position().row + 1,
            end_line: node.end_position().row + 1,
            byte_range: (declaration.start_byte(), node.end_byte()),
            name: name.to_string(),
            kind,
            parent,
        })
    }

    fn is_exported(&self, node: Node<'_>, name: &str, nested: bool) -> bool {
        match self.language {
            LanguageSupport::Rust => has_child_kind(node, "visibility_modifier"),
            LanguageSupport::Go => name.chars().next().is_some_and(char::is_uppercase),
            LanguageSupport::Python => !nested && !name.starts_with('_'),
            LanguageSupport::Java => {
                let mut cursor = node.walk();
                let modifiers = node
                    .children(&mut cursor)
                    .find(|child| child.kind() == "modifiers");
                modifiers.is_some_and(|modifiers| self.text(modifiers).contains("public"))
            }
            LanguageSupport::JavaScript | LanguageSupport::TypeScript => {
                let mut current = node.parent();
                while let Some(ancestor) = current {
                    match ancestor.kind() {
                        "export_statement" => return true,
                        "program" | "statement_block" | "class_body" => return false,
                        _ => current = ancestor.parent(),
                    }
                }
                false
            }
        }
    }

    fn signature(&self, node: Node<'_>) -> String {
        let body = node.child_by_field_name("body").or_else(|| {
            node.child_by_field_name("value")
                .and_then(|value| value.child_by_field_name("body"))
        });
        let end = body.map_or_else(|| node.end_byte(), |body| body.start_byte());
        let raw = self
            .source
            .get(node.start_byte()..end)
            .unwrap_or_default();
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut trimmed = collapsed.trim_end();
        if body.is_some() {
            trimmed = trimmed
                .strip_suffix("=>")
                .or_else(|| trimmed.strip_suffix(':'))
                .unwrap_or(trimmed)
                .trim_end();
        }
        if trimmed.chars().count() > MAX_SIGNATURE_CHARS {
            let cut: String = trimmed.chars().take(MAX_SIGNATURE_CHARS).collect();
            format!("{cut}...")
        } else {
            trimmed.to_string()
        }
    }

    fn record_import(&mut self, node: Node<'_>) {
        let line = node.start_position().row + 1;
        let sources: Vec<String> = match self.language {
            LanguageSupport::JavaScript | LanguageSupport::TypeScript => node
                .child_by_field_name("source")
                .map(|source| vec![unquote(self.text(source))])
                .unwrap_or_default(),
            LanguageSupport::Go => node
                .child_by_field_name("path")
                .map(|path| vec![unquote(self.text(path))])
                .unwrap_or_default(),
            LanguageSupport::Python => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    vec![self.text(module).to_string()]
                } else {
                    let mut cursor = node.walk();
                    node.children_by_field_name("name", &mut cursor)
                        .map(|name| {
                            let text = self.text(name);
                            text.split(" as ").next().unwrap_or(text).trim().to_string()
                        })
                        .collect()
                }
            }
            LanguageSupport::Rust => {
                let target = node
                    .child_by_field_name("argument")
                    .or_else(|| node.child_by_field_name("name"));
                target
                    .map(|target| vec![self.text(target).to_string()])
                    .unwrap_or_default()
            }
            LanguageSupport::Java => {
                let text = self.text(node);
                let cleaned = text
                    .trim_start_matches("import")
                    .trim()
                    .trim_start_matches("static ")
                    .trim_end_matches(';')
                    .trim();
                vec![cleaned.to_string()]
            }
        };
        for source in sources.into_iter().filter(|source| !source.is_empty()) {
            self.parsed.imports.push(Import { source, line });
        }
    }

    fn record_export_clause(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut inner = child.walk();
            for specifier in child.named_children(&mut inner) {
                let exported = specifier
                    .child_by_field_name("alias")
                    .or_else(|| specifier.child_by_field_name("name"));
                if let Some(name) = exported {
                    let name = self.text(name).to_string();
                    if !self.parsed.exports.contains(&name) {
                        self.parsed.exports.push(name);
                    }
                }
            }
        }
    }

    fn record_call(&mut self, node: Node<'_>, field: &str) {
        let Some(target) = node.child_by_field_name(field) else {
            return;
        };
        let callee = callee_name(self.text(target));
        if callee.is_empty() {
            return;
        }
        self.parsed.calls.push(CallSite {
            caller: self.functions.last().cloned(),
            callee,
            line: node.start_position().row + 1,
        });
    }

    fn text(&self, node: Node<'_>) -> &str {
        self.source.get(node.byte_range()).unwrap_or_default()
    }
}

fn has_child_kind(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|child| child.kind() == kind)
}

fn go_type_kind(node: Node<'_>) -> SymbolKind {
    match node.child_by_field_name("type").map(|ty| ty.kind()) {
        Some("struct_type") => SymbolKind::Struct,
        Some("interface_type") => SymbolKind::Interface,
        _ => SymbolKind::Type,
    }
}

/// `Vec<T>` -> `Vec`, `crate::Foo` -> `Foo`.
fn base_type_name(raw: &str) -> String {
    let without_generics = raw.split('<').next().unwrap_or(raw);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim()
        .to_string()
}

/// Last path segment of a call target: `self.client.send` -> `send`.
fn callee_name(raw: &str) -> String {
    let head = raw.split(['(', '<', '!']).next().unwrap_or(raw);
    head.rsplit(['.', ':'])
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(['"', '\'', '`']).to_string()
}

/// Source text of the named symbol's declaration.
pub fn extract_symbol(parsed: &ParsedFile, source: &str, name: &str) -> Option<String> {
    let symbol = parsed.find_symbol(name)?;
    let (start, end) = symbol.byte_range;
    let line_start = source.get(..start)?.rfind('\n').map_or(0, |index| index + 1);
    source.get(line_start..end).map(str::to_string)
}

/// Outline of a file: imports followed by every symbol signature, indented
/// under its parent. Bodies are omitted.
pub fn render_skeleton(parsed: &ParsedFile) -> String {
    let mut lines = Vec::new();
    for import in &parsed.imports {
        lines.push(format!("import {}", import.source));
    }
    if !parsed.imports.is_empty() && !parsed.symbols.is_empty() {
        lines.push(String::new());
    }
    for symbol in &parsed.symbols {
        let indent = if symbol.parent.is_some() { "    " } else { "" };
        let suffix = if symbol.kind.is_container() { "" } else { " { ... }" };
        lines.push(format!("{indent}{}{suffix}", symbol.signature));
    }
    lines.join("\n")
}
