use super::args::{Args, bounded_count};
use super::code::language_for_path;
use super::{CapabilityBridge, SdkError};
use crate::tree_sitter::{LanguageSupport, ParsedFile, Symbol};
use ctxkit_commons::{is_sensitive_file_name, relative_display};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const INTERNAL_PREFIXES: &[&str] = &[".", "/", "crate::", "super::", "self::"];
const SKIPPED_DIRECTORIES: &[&str] = &["node_modules", "target", ".git"];
/// Nodes emitted by one call graph, across all roots.
const MAX_GRAPH_NODES: usize = 1_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CallGraphOptions {
    function: Option<String>,
    depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StructureOptions {
    depth: Option<usize>,
}

fn is_internal_import(source: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|prefix| source.starts_with(prefix))
}

/// Last path segment of a call target: `self.items.get` -> `get`.
fn callee_name(callee: &str) -> &str {
    callee
        .rsplit(['.', ':'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(callee)
}

struct CallGraph<'p> {
    declared: BTreeMap<&'p str, &'p Symbol>,
    edges: BTreeMap<&'p str, BTreeSet<&'p str>>,
    max_depth: usize,
    emitted: usize,
}

impl<'p> CallGraph<'p> {
    fn new(parsed: &'p ParsedFile, max_depth: usize) -> Self {
        let declared: BTreeMap<&str, &Symbol> = parsed
            .symbols
            .iter()
            .filter(|symbol| symbol.kind.is_callable())
            .map(|symbol| (symbol.name.as_str(), symbol))
            .collect();
        let mut edges: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for call in &parsed.calls {
            let Some(caller) = call.caller.as_deref() else {
                continue;
            };
            let callee = callee_name(&call.callee);
            if declared.contains_key(callee) {
                edges.entry(caller).or_default().insert(callee);
            }
        }
        Self {
            declared,
            edges,
            max_depth,
            emitted: 0,
        }
    }

    fn node(&mut self, name: &'p str, depth: usize, path: &mut Vec<&'p str>) -> Value {
        self.emitted += 1;
        let line = self.declared.get(name).map(|symbol| symbol.line);
        if path.contains(&name) {
            return json!({ "name": name, "line": line, "cycle": true });
        }
        let callees: Vec<&str> = self
            .edges
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        if callees.is_empty() {
            return json!({ "name": name, "line": line, "calls": [] });
        }
        if depth >= self.max_depth || self.emitted >= MAX_GRAPH_NODES {
            return json!({ "name": name, "line": line, "calls": [], "truncated": true });
        }

        path.push(name);
        let mut calls = Vec::with_capacity(callees.len());
        for callee in callees {
            if self.emitted >= MAX_GRAPH_NODES {
                break;
            }
            calls.push(self.node(callee, depth + 1, path));
        }
        path.pop();
        json!({ "name": name, "line": line, "calls": calls })
    }
}

impl CapabilityBridge {
    /// Read and parse a source file inside the sandbox.
    fn parse_file(&self, path: &str) -> Result<(LanguageSupport, ParsedFile), SdkError> {
        let content = self.read_text(path)?;
        let language = self.resolve_language(path)?;
        let parsed = self.parse_source(&content, language)?;
        Ok((language, parsed))
    }

    pub(super) fn analyze_dependencies(&self, args: &Args) -> Result<Value, SdkError> {
        let path = args.string(0, "path")?;
        let (language, parsed) = self.parse_file(path)?;
        let mut internal = BTreeSet::new();
        let mut external = BTreeSet::new();
        for import in &parsed.imports {
            if is_internal_import(&import.source) {
                internal.insert(import.source.clone());
            } else {
                external.insert(import.source.clone());
            }
        }
        Ok(json!({
            "path": path,
            "language": language.as_str(),
            "imports": parsed.imports,
            "internal": internal,
            "external": external,
        }))
    }

    pub(super) fn analyze_call_graph(&self, args: &Args) -> Result<Value, SdkError> {
        let path = args.string(0, "path")?;
        let options: CallGraphOptions = args.options(1)?;
        let ceiling = self.limits.max_traversal_depth;
        let depth = bounded_count(options.depth, ceiling, ceiling);
        let (_, parsed) = self.parse_file(path)?;
        let mut graph = CallGraph::new(&parsed, depth);

        let roots: Vec<&str> = match options.function.as_deref() {
            Some(function) => {
                let Some((name, _)) = graph.declared.get_key_value(function) else {
                    return Err(args.invalid(format!("function '{function}' is not declared in {path}")));
                };
                vec![*name]
            }
            None => graph.declared.keys().copied().collect(),
        };

        let mut nodes = Vec::with_capacity(roots.len());
        for root in roots {
            if graph.emitted >= MAX_GRAPH_NODES {
                break;
            }
            nodes.push(graph.node(root, 0, &mut Vec::new()));
        }
        Ok(json!({
            "path": path,
            "depth": depth,
            "graph": nodes,
            "truncated": graph.emitted >= MAX_GRAPH_NODES,
        }))
    }

    pub(super) fn analyze_exports(&self, args: &Args) -> Result<Value, SdkError> {
        let path = args.string(0, "path")?;
        let (language, parsed) = self.parse_file(path)?;
        let exports: Vec<Value> = parsed
            .exports
            .iter()
            .map(|name| match parsed.find_symbol(name) {
                Some(symbol) => json!({ "name": name, "kind": symbol.kind, "line": symbol.line }),
                None => json!({ "name": name }),
            })
            .collect();
        Ok(json!({
            "path": path,
            "language": language.as_str(),
            "exports": exports,
        }))
    }

    pub(super) fn analyze_structure(&self, args: &Args) -> Result<Value, SdkError> {
        let path = args.opt_string(0, "path")?.unwrap_or(".");
        let options: StructureOptions = args.options(1)?;
        let ceiling = self.limits.max_traversal_depth;
        let depth = bounded_count(options.depth, ceiling, ceiling);
        let base = self.resolve_existing(path)?;
        if !base.is_dir() {
            return Err(args.invalid(format!("'{path}' is not a directory")));
        }

        let mut walk = StructureWalk {
            bridge: self,
            max_depth: depth,
            max_entries: self.limits.max_files,
            files: 0,
            directories: 0,
            truncated: false,
        };
        let tree = walk.directory(&base, 0)?;
        Ok(json!({
            "path": relative_display(&base, &self.root),
            "depth": depth,
            "files": walk.files,
            "directories": walk.directories,
            "truncated": walk.truncated,
            "tree": tree,
        }))
    }
}

/// Files and directories both count against `max_entries`.
struct StructureWalk<'b> {
    bridge: &'b CapabilityBridge,
    max_depth: usize,
    max_entries: usize,
    files: usize,
    directories: usize,
    truncated: bool,
}

impl StructureWalk<'_> {
    fn remaining(&self) -> usize {
        self.max_entries.saturating_sub(self.files + self.directories)
    }

    fn directory(&mut self, dir: &Path, depth: usize) -> Result<Value, SdkError> {
        self.bridge.ensure_active()?;
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());

        // Read at most one entry past the budget so truncation is still seen.
        let wanted = self.remaining().saturating_add(1);
        let mut entries: Vec<_> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|entry| {
                    let entry_name = entry.file_name();
                    let entry_name = entry_name.to_string_lossy();
                    !(entry_name.starts_with('.')
                        || SKIPPED_DIRECTORIES.contains(&&*entry_name)
                        || is_sensitive_file_name(&entry_name))
                })
                .take(wanted)
                .collect(),
            Err(_) => Vec::new(),
        };
        entries.sort_by_key(|entry| entry.file_name());

        let mut children = Vec::new();
        for entry in entries {
            let entry_name = entry.file_name().to_string_lossy().into_owned();
            let Ok(kind) = entry.file_type() else {
                continue;
            };
            if self.remaining() == 0 {
                self.truncated = true;
                break;
            }
            if kind.is_dir() {
                self.directories += 1;
                if depth + 1 >= self.max_depth {
                    self.truncated = true;
                    children.push(json!({ "name": entry_name, "type": "directory", "truncated": true }));
                } else {
                    children.push(self.directory(&entry.path(), depth + 1)?);
                }
            } else if kind.is_file() {
                self.files += 1;
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                let language = language_for_path(&entry_name).map(LanguageSupport::as_str);
                children.push(json!({
                    "name": entry_name,
                    "type": "file",
                    "size": size,
                    "language": language,
                }));
            }
        }
        Ok(json!({ "name": name, "type": "directory", "children": children }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::SdkFunction;
    use super::super::test_support::*;
    use super::*;
    use crate::sdk::SdkHost;
    use ctxkit_config::SdkLimits;
    use std::fs;
    use tokio_util::sync::CancellationToken;

    const RUST_SOURCE: &str = r#"use std::fmt;
use crate::config::Settings;

pub fn run() {
    load();
    render();
}

fn load() {
    parse();
}

fn parse() {
    load();
}

fn render() {}
"#;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/a/b/c/d/e")).unwrap();
        fs::write(dir.path().join("src/main.rs"), RUST_SOURCE).unwrap();
        fs::write(dir.path().join("src/a/b/c/d/e/deep.txt"), "deep").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("id_rsa"), "key").unwrap();
        dir
    }

    #[test]
    fn dependencies_split_internal_and_external() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let deps = call(&bridge, SdkFunction::AnalyzeDependencies, vec![json!("src/main.rs")]);
        assert_eq!(deps["language"], json!("rust"));
        assert_eq!(deps["internal"], json!(["crate::config::Settings"]));
        assert_eq!(deps["external"], json!(["std::fmt"]));
    }

    #[test]
    fn call_graph_follows_local_calls_and_marks_cycles() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let graph = call(
            &bridge,
            SdkFunction::AnalyzeCallGraph,
            vec![json!("src/main.rs"), json!({"function": "run"})],
        );
        let run = &graph["graph"][0];
        assert_eq!(run["name"], json!("run"));
        let load = &run["calls"][0];
        assert_eq!(load["name"], json!("load"));
        let parse = &load["calls"][0];
        assert_eq!(parse["name"], json!("parse"));
        assert_eq!(parse["calls"][0]["cycle"], json!(true));
        assert_eq!(run["calls"][1]["name"], json!("render"));
    }

    #[test]
    fn call_graph_depth_is_bounded() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let graph = call(
            &bridge,
            SdkFunction::AnalyzeCallGraph,
            vec![json!("src/main.rs"), json!({"function": "run", "depth": 1})],
        );
        assert_eq!(graph["depth"], json!(1));
        let load = &graph["graph"][0]["calls"][0];
        assert_eq!(load["truncated"], json!(true));

        let clamped = call(
            &bridge,
            SdkFunction::AnalyzeCallGraph,
            vec![json!("src/main.rs"), json!({"depth": 50})],
        );
        assert_eq!(clamped["depth"], json!(5));
    }

    #[test]
    fn call_graph_rejects_unknown_functions() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let error = bridge
            .call(
                SdkFunction::AnalyzeCallGraph,
                vec![json!("src/main.rs"), json!({"function": "missing"})],
            )
            .unwrap_err();
        assert!(error.to_string().contains("not declared"), "{error}");
    }

    #[test]
    fn exports_list_public_symbols() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let exports = call(&bridge, SdkFunction::AnalyzeExports, vec![json!("src/main.rs")]);
        assert_eq!(exports["exports"][0]["name"], json!("run"));
        assert_eq!(exports["exports"][0]["kind"], json!("function"));
    }

    #[test]
    fn structure_skips_noise_and_bounds_depth() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let structure = call(&bridge, SdkFunction::AnalyzeStructure, vec![]);
        let text = structure.to_string();
        assert!(!text.contains("node_modules"), "{text}");
        assert!(!text.contains("id_rsa"), "{text}");
        assert!(!text.contains("deep.txt"), "{text}");
        assert_eq!(structure["truncated"], json!(true));
        assert_eq!(structure["path"], json!("."));
    }

    #[test]
    fn structure_bounds_file_count() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..20 {
            fs::write(dir.path().join(format!("f{index:02}.txt")), "x").unwrap();
        }
        let limits = SdkLimits {
            max_files: 5,
            max_search_results: 5,
            ..SdkLimits::default()
        };
        let bridge = bridge_with(dir.path(), limits, CancellationToken::new());
        let structure = call(&bridge, SdkFunction::AnalyzeStructure, vec![json!(".")]);
        assert_eq!(structure["files"], json!(5));
        assert_eq!(structure["truncated"], json!(true));
    }

    #[test]
    fn structure_counts_directories_toward_the_entry_cap() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..30 {
            fs::create_dir(dir.path().join(format!("d{index:02}"))).unwrap();
        }
        let limits = SdkLimits {
            max_files: 4,
            max_search_results: 4,
            ..SdkLimits::default()
        };
        let bridge = bridge_with(dir.path(), limits, CancellationToken::new());
        let structure = call(&bridge, SdkFunction::AnalyzeStructure, vec![json!(".")]);
        assert_eq!(structure["directories"], json!(4));
        assert_eq!(structure["files"], json!(0));
        assert_eq!(structure["truncated"], json!(true));
        assert_eq!(structure["tree"]["children"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn import_classification() {
        assert!(is_internal_import("./util"));
        assert!(is_internal_import("super::model"));
        assert!(!is_internal_import("serde::Deserialize"));
        assert_eq!(callee_name("self.items.get"), "get");
        assert_eq!(callee_name("Vec::new"), "new");
    }
}
