//! `ctx.pipeline`: ordered, pre-validated transformation steps over files
//! and values, plus named templates whose results are cached for a short
//! time.

use super::args::{Args, bounded_count, type_name};
use super::{CapabilityBridge, SdkError, SdkFunction};
use crate::compression::{MAX_RATIO, MIN_RATIO};
use ctxkit_commons::{PathRejection, check_glob_pattern};
use lru::LruCache;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

pub const MAX_STEPS: usize = 20;
pub const TEMPLATE_NAMES: &[&str] = &["summarize", "find-todos", "file-list", "largest-files"];
const TEMPLATE_CACHE_CAPACITY: usize = 64;
const DEFAULT_TEMPLATE_GLOB: &str = "**/*";
const DEFAULT_SUMMARY_FILES: usize = 20;
const DEFAULT_LARGEST_FILES: usize = 10;
const TODO_PATTERN: &str = r"\b(TODO|FIXME|HACK|XXX)\b";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Reduction {
    #[default]
    Count,
    Sum,
    Concat,
    GroupBy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Strategy {
    #[default]
    Auto,
    Logs,
    Diff,
    Semantic,
}

impl Strategy {
    fn function(self) -> SdkFunction {
        match self {
            Strategy::Auto => SdkFunction::CompressAuto,
            Strategy::Logs => SdkFunction::CompressLogs,
            Strategy::Diff => SdkFunction::CompressDiff,
            Strategy::Semantic => SdkFunction::CompressSemantic,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One step as written by the script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StepSpec {
    Glob {
        pattern: String,
    },
    Filter {
        pattern: String,
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        invert: bool,
    },
    Read,
    Map {
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        fields: Option<Vec<String>>,
    },
    Reduce {
        #[serde(default)]
        operation: Reduction,
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        separator: Option<String>,
    },
    Compress {
        #[serde(default)]
        strategy: Strategy,
        #[serde(default)]
        ratio: Option<f64>,
    },
    Limit {
        count: usize,
    },
    Sort {
        #[serde(default)]
        by: Option<String>,
        #[serde(default)]
        order: SortOrder,
    },
    Unique {
        #[serde(default)]
        by: Option<String>,
    },
}

/// A validated step, ready to run.
#[derive(Debug)]
enum Step {
    Glob(String),
    Filter {
        regex: Regex,
        field: Option<String>,
        invert: bool,
    },
    Read,
    MapField(String),
    MapFields(Vec<String>),
    Reduce {
        operation: Reduction,
        field: Option<String>,
        separator: String,
    },
    Compress {
        strategy: Strategy,
        ratio: Option<f64>,
    },
    Limit(usize),
    Sort {
        by: Option<String>,
        order: SortOrder,
    },
    Unique(Option<String>),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Glob(_) => "glob",
            Step::Filter { .. } => "filter",
            Step::Read => "read",
            Step::MapField(_) | Step::MapFields(_) => "map",
            Step::Reduce { .. } => "reduce",
            Step::Compress { .. } => "compress",
            Step::Limit(_) => "limit",
            Step::Sort { .. } => "sort",
            Step::Unique(_) => "unique",
        }
    }
}

fn step_error(index: usize, message: impl std::fmt::Display) -> SdkError {
    SdkError::invalid("pipeline", format!("step {}: {message}", index + 1))
}

/// Parse and check every step before anything runs.
fn validate_steps(raw: &Value, root: &Path) -> Result<Vec<Step>, SdkError> {
    let Value::Array(specs) = raw else {
        return Err(SdkError::invalid(
            "pipeline",
            format!("steps must be an array, got {}", type_name(raw)),
        ));
    };
    if specs.is_empty() {
        return Err(SdkError::invalid("pipeline", "at least one step is required"));
    }
    if specs.len() > MAX_STEPS {
        return Err(SdkError::invalid(
            "pipeline",
            format!("too many steps ({}, limit {MAX_STEPS})", specs.len()),
        ));
    }

    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| validate_step(index, spec, root))
        .collect()
}

fn validate_step(index: usize, spec: &Value, root: &Path) -> Result<Step, SdkError> {
    let spec: StepSpec =
        serde_json::from_value(spec.clone()).map_err(|error| step_error(index, error))?;
    Ok(match spec {
        StepSpec::Glob { pattern } => {
            check_glob_pattern(&pattern, root)?;
            glob::Pattern::new(&pattern).map_err(|error| step_error(index, error))?;
            Step::Glob(pattern)
        }
        StepSpec::Filter {
            pattern,
            field,
            invert,
        } => Step::Filter {
            regex: RegexBuilder::new(&pattern)
                .size_limit(1 << 20)
                .build()
                .map_err(|error| step_error(index, error))?,
            field,
            invert,
        },
        StepSpec::Read => Step::Read,
        StepSpec::Map { field, fields } => match (field, fields) {
            (Some(field), None) => Step::MapField(field),
            (None, Some(fields)) if !fields.is_empty() => Step::MapFields(fields),
            _ => return Err(step_error(index, "map needs exactly one of 'field' or 'fields'")),
        },
        StepSpec::Reduce {
            operation,
            field,
            separator,
        } => {
            if operation == Reduction::GroupBy && field.is_none() {
                return Err(step_error(index, "groupBy needs a 'field'"));
            }
            Step::Reduce {
                operation,
                field,
                separator: separator.unwrap_or_else(|| "\n".to_string()),
            }
        }
        StepSpec::Compress { strategy, ratio } => {
            if let Some(ratio) = ratio
                && !(MIN_RATIO..=MAX_RATIO).contains(&ratio)
            {
                return Err(step_error(
                    index,
                    format!("ratio must be between {MIN_RATIO} and {MAX_RATIO}"),
                ));
            }
            Step::Compress { strategy, ratio }
        }
        StepSpec::Limit { count } => Step::Limit(count),
        StepSpec::Sort { by, order } => Step::Sort { by, order },
        StepSpec::Unique { by } => Step::Unique(by),
    })
}

fn number(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn reduce(operation: Reduction, field: Option<&str>, separator: &str, items: Vec<Value>) -> Value {
    match operation {
        Reduction::Count => Value::from(items.len()),
        Reduction::Sum => number(
            items
                .iter()
                .filter_map(|item| field_of(item, field).as_f64())
                .sum(),
        ),
        Reduction::Concat => Value::String(
            items
                .iter()
                .map(|item| match (field, item.get("content")) {
                    (None, Some(Value::String(content))) => content.clone(),
                    _ => text_of(item, field),
                })
                .collect::<Vec<_>>()
                .join(separator),
        ),
        Reduction::GroupBy => {
            let mut groups = Map::new();
            for item in items {
                let key = text_of(&item, field);
                if let Value::Array(members) = groups
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()))
                {
                    members.push(item);
                }
            }
            Value::Object(groups)
        }
    }
}

/// Text a filter or concat looks at.
fn text_of(item: &Value, field: Option<&str>) -> String {
    let target = match field {
        Some(field) => item.get(field).unwrap_or(&Value::Null),
        None => match item {
            Value::Object(map) => map.get("path").unwrap_or(item),
            _ => item,
        },
    };
    match target {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn field_of<'v>(item: &'v Value, field: Option<&str>) -> &'v Value {
    match field {
        Some(field) => item.get(field).unwrap_or(&Value::Null),
        None => item,
    }
}

/// Numbers before strings before everything else; like kinds compare
/// naturally.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Bool(_) => 2,
            Value::Null => 4,
            _ => 3,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn item_path(item: &Value) -> Option<&str> {
    match item {
        Value::String(path) => Some(path),
        Value::Object(map) => map.get("path").and_then(Value::as_str),
        _ => None,
    }
}

impl CapabilityBridge {
    pub(super) fn pipeline_run(&self, args: &Args) -> Result<Value, SdkError> {
        let raw = args.get(0).ok_or_else(|| args.invalid("'steps' is required"))?;
        let steps = validate_steps(raw, &self.root)?;
        let input = args.get(1).cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        self.run_steps(&steps, input)
    }

    fn run_steps(&self, steps: &[Step], input: Value) -> Result<Value, SdkError> {
        let mut state = input;
        for (index, step) in steps.iter().enumerate() {
            self.ensure_active()?;
            state = self.apply_step(index, step, state)?;
            debug!(step = step.name(), index, "pipeline step applied");
        }
        Ok(state)
    }

    fn apply_step(&self, index: usize, step: &Step, state: Value) -> Result<Value, SdkError> {
        if let Step::Glob(pattern) = step {
            let paths = self.glob_paths(pattern, "pipeline")?;
            return Ok(Value::Array(paths.into_iter().map(Value::String).collect()));
        }
        if let Step::Compress { strategy, ratio } = step {
            return self.compress_state(*strategy, *ratio, state);
        }

        let items = match state {
            Value::Array(items) => items,
            other => {
                return Err(step_error(
                    index,
                    format!("{} expects a list, got {}", step.name(), type_name(&other)),
                ));
            }
        };

        Ok(match step {
            Step::Filter {
                regex,
                field,
                invert,
            } => Value::Array(
                items
                    .into_iter()
                    .filter(|item| regex.is_match(&text_of(item, field.as_deref())) != *invert)
                    .collect(),
            ),
            Step::Read => Value::Array(self.read_items(index, items)?),
            Step::MapField(field) => Value::Array(
                items
                    .iter()
                    .map(|item| item.get(field.as_str()).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
            Step::MapFields(fields) => Value::Array(
                items
                    .iter()
                    .map(|item| {
                        let picked: Map<String, Value> = fields
                            .iter()
                            .map(|field| {
                                (field.clone(), item.get(field.as_str()).cloned().unwrap_or(Value::Null))
                            })
                            .collect();
                        Value::Object(picked)
                    })
                    .collect(),
            ),
            Step::Reduce {
                operation,
                field,
                separator,
            } => reduce(*operation, field.as_deref(), separator, items),
            Step::Limit(count) => Value::Array(items.into_iter().take(*count).collect()),
            Step::Sort { by, order } => {
                let mut items = items;
                items.sort_by(|a, b| {
                    let ordering = compare_values(field_of(a, by.as_deref()), field_of(b, by.as_deref()));
                    match order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    }
                });
                Value::Array(items)
            }
            Step::Unique(by) => {
                let mut seen = HashSet::new();
                Value::Array(
                    items
                        .into_iter()
                        .filter(|item| seen.insert(field_of(item, by.as_deref()).to_string()))
                        .collect(),
                )
            }
            Step::Glob(_) | Step::Compress { .. } => Value::Array(items),
        })
    }

    /// Turn path items into `{path, content, size, lines}`. Files above the
    /// size limit are skipped rather than failing the whole pipeline.
    fn read_items(&self, index: usize, items: Vec<Value>) -> Result<Vec<Value>, SdkError> {
        let mut read = Vec::with_capacity(items.len());
        for item in items.iter().take(self.limits.max_files) {
            self.ensure_active()?;
            let Some(path) = item_path(item) else {
                return Err(step_error(index, "read expects paths or objects with a 'path'"));
            };
            let canonical = self.resolve_existing(path)?;
            let size = std::fs::metadata(&canonical)
                .map_err(|_| PathRejection::NotFound(path.to_string()))?
                .len();
            if size > self.limits.max_file_size_bytes {
                debug!(path, size, "pipeline read skipped oversized file");
                continue;
            }
            let content = self.read_text(path)?;
            read.push(json!({
                "path": path,
                "lines": content.lines().count(),
                "size": size,
                "content": content,
            }));
        }
        Ok(read)
    }

    fn compress_state(&self, strategy: Strategy, ratio: Option<f64>, state: Value) -> Result<Value, SdkError> {
        let function = strategy.function();
        match state {
            Value::String(text) => {
                let result = self.compress_text(function, &text, ratio)?;
                serde_json::to_value(result).map_err(|error| SdkError::Other(error.into()))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(match item {
                        Value::String(text) => {
                            Value::String(self.compress_text(function, &text, ratio)?.content)
                        }
                        Value::Object(mut map) => {
                            if let Some(Value::String(content)) = map.get("content") {
                                let result = self.compress_text(function, content, ratio)?;
                                map.insert("content".into(), Value::String(result.content));
                                map.insert("originalTokens".into(), result.original_tokens.into());
                                map.insert("compressedTokens".into(), result.compressed_tokens.into());
                            }
                            Value::Object(map)
                        }
                        other => other,
                    });
                }
                Ok(Value::Array(out))
            }
            other => Ok(other),
        }
    }

    pub(super) fn pipeline_template(&self, args: &Args) -> Result<Value, SdkError> {
        let name = args.string(0, "name")?;
        if !TEMPLATE_NAMES.contains(&name) {
            return Err(args.invalid(format!(
                "unknown template '{name}'. Available: {}",
                TEMPLATE_NAMES.join(", ")
            )));
        }
        let options: TemplateOptions = args.options(1)?;
        let resolved = options.resolve(name);
        let key = TemplateKey {
            name: name.to_string(),
            args: serde_json::to_string(&resolved).unwrap_or_default(),
            root: self.root.clone(),
        };
        let cache = &self.collaborators.templates;
        if let Some(hit) = cache.get(&key) {
            debug!(template = name, "template cache hit");
            return Ok(hit);
        }
        let result = self.run_template(name, &resolved)?;
        cache.put(key, result.clone());
        Ok(result)
    }

    fn run_template(&self, name: &str, options: &ResolvedTemplate) -> Result<Value, SdkError> {
        match name {
            "summarize" => self.run_steps(
                &[
                    Step::Glob(options.glob.clone()),
                    Step::Limit(options.limit),
                    Step::Read,
                    Step::Compress {
                        strategy: Strategy::Auto,
                        ratio: None,
                    },
                ],
                Value::Array(Vec::new()),
            ),
            "file-list" => self.run_steps(
                &[Step::Glob(options.glob.clone()), Step::Limit(options.limit)],
                Value::Array(Vec::new()),
            ),
            "find-todos" => {
                let regex = Regex::new(TODO_PATTERN).map_err(|error| SdkError::Other(error.into()))?;
                let files = self.candidate_files(Some(&options.glob), "pipeline.template")?;
                Ok(Value::Array(self.grep_template(&regex, &files, options.limit)?))
            }
            _ => {
                let mut files = self.candidate_files(Some(&options.glob), "pipeline.template")?;
                files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.relative.cmp(&b.relative)));
                Ok(Value::Array(
                    files
                        .into_iter()
                        .take(options.limit)
                        .map(|file| json!({ "path": file.relative, "size": file.size }))
                        .collect(),
                ))
            }
        }
    }

    fn grep_template(
        &self,
        regex: &Regex,
        files: &[super::walk::WalkedFile],
        limit: usize,
    ) -> Result<Vec<Value>, SdkError> {
        let mut found = Vec::new();
        for file in files {
            self.ensure_active()?;
            let Some(content) = self.read_walked(file) else {
                continue;
            };
            for (index, line) in content.lines().enumerate() {
                if let Some(marker) = regex.find(line) {
                    found.push(json!({
                        "path": file.relative,
                        "line": index + 1,
                        "kind": marker.as_str(),
                        "text": line.trim(),
                    }));
                    if found.len() >= limit {
                        return Ok(found);
                    }
                }
            }
        }
        Ok(found)
    }
}

pub(super) fn template_list() -> Value {
    Value::Array(
        TEMPLATE_NAMES
            .iter()
            .map(|name| Value::String((*name).to_string()))
            .collect(),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TemplateOptions {
    glob: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
struct ResolvedTemplate {
    glob: String,
    limit: usize,
}

impl TemplateOptions {
    fn resolve(self, name: &str) -> ResolvedTemplate {
        let default_limit = match name {
            "largest-files" => DEFAULT_LARGEST_FILES,
            "summarize" => DEFAULT_SUMMARY_FILES,
            _ => super::search::MAX_SEARCH_RESULTS_CEILING,
        };
        ResolvedTemplate {
            glob: self.glob.unwrap_or_else(|| DEFAULT_TEMPLATE_GLOB.to_string()),
            limit: bounded_count(self.limit, default_limit, super::search::MAX_SEARCH_RESULTS_CEILING),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TemplateKey {
    name: String,
    args: String,
    root: PathBuf,
}

struct CachedResult {
    value: Value,
    stored_at: Instant,
}

/// Template results keyed by template name, resolved arguments and working
/// directory. Entries expire after a fixed TTL.
pub struct TemplateCache {
    ttl: Duration,
    entries: Mutex<LruCache<TemplateKey, CachedResult>>,
}

impl TemplateCache {
    pub fn new(ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(TEMPLATE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &TemplateKey) -> Option<Value> {
        let mut entries = self.entries.lock();
        let fresh = entries
            .peek(key)
            .map(|entry| entry.stored_at.elapsed() < self.ttl)?;
        if fresh {
            entries.get(key).map(|entry| entry.value.clone())
        } else {
            entries.pop(key);
            None
        }
    }

    fn put(&self, key: TemplateKey, value: Value) {
        self.entries.lock().put(
            key,
            CachedResult {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::sdk::SdkHost;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.rs"), "fn a() {}\n// TODO: tidy\n").unwrap();
        fs::write(dir.path().join("src/b.rs"), "fn b() {}\nfn bb() {}\nfn bbb() {}\n").unwrap();
        fs::write(dir.path().join("src/c.txt"), "FIXME later\n").unwrap();
        dir
    }

    fn run(bridge: &CapabilityBridge, steps: Value) -> Value {
        call(bridge, SdkFunction::PipelineRun, vec![steps])
    }

    #[test]
    fn glob_read_sort_map_in_order() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let result = run(
            &bridge,
            json!([
                {"type": "glob", "pattern": "src/*.rs"},
                {"type": "read"},
                {"type": "sort", "by": "lines", "order": "desc"},
                {"type": "map", "fields": ["path", "lines"]},
            ]),
        );
        assert_eq!(
            result,
            json!([
                {"path": "src/b.rs", "lines": 3},
                {"path": "src/a.rs", "lines": 2},
            ])
        );
    }

    #[test]
    fn filter_limit_unique_and_reduce() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let count = run(
            &bridge,
            json!([
                {"type": "glob", "pattern": "src/*"},
                {"type": "filter", "pattern": "\\.txt$", "invert": true},
                {"type": "reduce", "operation": "count"},
            ]),
        );
        assert_eq!(count, json!(2));

        let values = call(
            &bridge,
            SdkFunction::PipelineRun,
            vec![
                json!([
                    {"type": "unique"},
                    {"type": "limit", "count": 2},
                    {"type": "reduce", "operation": "sum"},
                ]),
                json!([3, 3, 4, 5]),
            ],
        );
        assert_eq!(values, json!(7));

        let grouped = call(
            &bridge,
            SdkFunction::PipelineRun,
            vec![
                json!([{"type": "reduce", "operation": "groupBy", "field": "kind"}]),
                json!([{"kind": "a", "n": 1}, {"kind": "b", "n": 2}, {"kind": "a", "n": 3}]),
            ],
        );
        assert_eq!(grouped["a"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn steps_are_validated_before_running() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let cases = [
            (json!([]), "at least one step"),
            (json!([{"type": "explode"}]), "step 1"),
            (json!([{"type": "glob", "pattern": "*"}, {"type": "map"}]), "step 2"),
            (json!([{"type": "compress", "strategy": "semantic", "ratio": 2.0}]), "ratio"),
            (json!([{"type": "reduce", "operation": "groupBy"}]), "groupBy"),
            (json!([{"type": "filter", "pattern": "("}]), "step 1"),
        ];
        for (steps, expected) in cases {
            let error = bridge
                .call(SdkFunction::PipelineRun, vec![steps.clone()])
                .unwrap_err();
            assert!(error.to_string().contains(expected), "{steps}: {error}");
        }
        let too_many = Value::Array(vec![json!({"type": "limit", "count": 1}); MAX_STEPS + 1]);
        let error = bridge
            .call(SdkFunction::PipelineRun, vec![too_many])
            .unwrap_err();
        assert!(error.to_string().contains("too many steps"), "{error}");
    }

    #[test]
    fn glob_steps_reject_escapes_up_front() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let error = bridge
            .call(
                SdkFunction::PipelineRun,
                vec![json!([{"type": "glob", "pattern": "../*"}])],
            )
            .unwrap_err();
        assert!(error.is_path_rejection(), "{error}");
    }

    #[test]
    fn read_skips_oversized_files() {
        let dir = fixture();
        fs::write(dir.path().join("src/big.rs"), "x".repeat(4096)).unwrap();
        let limits = ctxkit_config::SdkLimits {
            max_file_size_bytes: 1024,
            ..ctxkit_config::SdkLimits::default()
        };
        let bridge = bridge_with(dir.path(), limits, tokio_util::sync::CancellationToken::new());
        let result = run(
            &bridge,
            json!([
                {"type": "glob", "pattern": "src/*.rs"},
                {"type": "read"},
                {"type": "map", "field": "path"},
            ]),
        );
        assert_eq!(result, json!(["src/a.rs", "src/b.rs"]));
    }

    #[test]
    fn templates_run_and_are_cached() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let todos = call(&bridge, SdkFunction::PipelineTemplate, vec![json!("find-todos")]);
        assert_eq!(
            todos,
            json!([
                {"path": "src/a.rs", "line": 2, "kind": "TODO", "text": "// TODO: tidy"},
                {"path": "src/c.txt", "line": 1, "kind": "FIXME", "text": "FIXME later"},
            ])
        );
        assert_eq!(bridge.collaborators.templates.len(), 1);

        fs::write(dir.path().join("src/d.rs"), "// TODO: new\n").unwrap();
        let cached = call(&bridge, SdkFunction::PipelineTemplate, vec![json!("find-todos")]);
        assert_eq!(cached, todos);

        let largest = call(
            &bridge,
            SdkFunction::PipelineTemplate,
            vec![json!("largest-files"), json!({"limit": 1})],
        );
        assert_eq!(largest, json!([{"path": "src/b.rs", "size": 33}]));
    }

    #[test]
    fn expired_template_results_are_recomputed() {
        let cache = TemplateCache::new(Duration::from_millis(0));
        let key = TemplateKey {
            name: "file-list".into(),
            args: "{}".into(),
            root: PathBuf::from("/w"),
        };
        cache.put(key.clone(), json!(["a"]));
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn unknown_templates_list_alternatives() {
        let dir = fixture();
        let bridge = bridge(dir.path());
        let error = bridge
            .call(SdkFunction::PipelineTemplate, vec![json!("deploy")])
            .unwrap_err();
        assert!(error.to_string().contains("summarize, find-todos"), "{error}");
        assert_eq!(
            call(&bridge, SdkFunction::PipelineTemplates, vec![]),
            json!(["summarize", "find-todos", "file-list", "largest-files"])
        );
    }
}
