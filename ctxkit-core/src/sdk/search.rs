use super::args::{Args, bounded_count};
use super::files::GLOB_MATCH_OPTIONS;
use super::walk::WalkedFile;
use super::{CapabilityBridge, SdkError};
use super::code::language_for_path;
use ctxkit_commons::check_glob_pattern;
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Upper bound on `maxResults`, whatever the caller asks for.
pub(super) const MAX_SEARCH_RESULTS_CEILING: usize = 1_000;
const REGEX_SIZE_LIMIT: usize = 1 << 20;
const MAX_LINE_CHARS: usize = 300;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchOptions {
    glob: Option<String>,
    max_results: Option<usize>,
    ignore_case: bool,
    kind: Option<String>,
}

impl CapabilityBridge {
    /// Files a search may look at: everything under the root, or the
    /// matches of an optional glob, capped at `maxFiles`.
    pub(super) fn candidate_files(
        &self,
        glob: Option<&str>,
        function: &str,
    ) -> Result<Vec<WalkedFile>, SdkError> {
        let limit = self.limits.max_files;
        let outcome = match glob {
            None => self.walk_files(&self.root, None, limit, |_| true)?,
            Some(pattern) => {
                let base = check_glob_pattern(pattern, &self.root)?;
                let matcher = Pattern::new(pattern.trim_start_matches("./")).map_err(|error| {
                    SdkError::invalid(function, format!("invalid glob '{pattern}': {error}"))
                })?;
                self.walk_files(&base, None, limit, |relative| {
                    matcher.matches_with(relative, GLOB_MATCH_OPTIONS)
                })?
            }
        };
        if outcome.truncated {
            debug!(function, limit, "file candidates truncated");
        }
        Ok(outcome.files)
    }

    fn result_limit(&self, requested: Option<usize>) -> usize {
        bounded_count(requested, self.limits.max_search_results, MAX_SEARCH_RESULTS_CEILING)
    }

    /// Matching lines across `files`, in file order.
    fn grep_lines(
        &self,
        regex: &Regex,
        files: &[WalkedFile],
        limit: usize,
    ) -> Result<Vec<Value>, SdkError> {
        let mut matches = Vec::new();
        for file in files {
            self.ensure_active()?;
            let Some(content) = self.read_walked(file) else {
                continue;
            };
            for (index, line) in content.lines().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                matches.push(json!({
                    "path": file.relative,
                    "line": index + 1,
                    "content": clip_line(line),
                }));
                if matches.len() >= limit {
                    return Ok(matches);
                }
            }
        }
        Ok(matches)
    }

    pub(super) fn search_grep(&self, args: &Args) -> Result<Value, SdkError> {
        let pattern = args.string(0, "pattern")?;
        let options: SearchOptions = args.options(1)?;
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(options.ignore_case)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|error| args.invalid(format!("invalid pattern: {error}")))?;
        let files = self.candidate_files(options.glob.as_deref(), "search.grep")?;
        let limit = self.result_limit(options.max_results);
        Ok(Value::Array(self.grep_lines(&regex, &files, limit)?))
    }

    pub(super) fn search_references(&self, args: &Args) -> Result<Value, SdkError> {
        let symbol = args.string(0, "symbol")?;
        if !symbol
            .chars()
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$')
        {
            return Err(args.invalid("symbol must be a plain identifier"));
        }
        let options: SearchOptions = args.options(1)?;
        let regex = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(symbol)))
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|error| args.invalid(format!("invalid symbol: {error}")))?;
        let files = self.candidate_files(options.glob.as_deref(), "search.references")?;
        let limit = self.result_limit(options.max_results);
        Ok(Value::Array(self.grep_lines(&regex, &files, limit)?))
    }

    pub(super) fn search_symbols(&self, args: &Args) -> Result<Value, SdkError> {
        let query = args.string(0, "query")?.to_lowercase();
        let options: SearchOptions = args.options(1)?;
        let kind = options.kind.as_deref().map(str::to_ascii_lowercase);
        let limit = self.result_limit(options.max_results);
        let files = self.candidate_files(options.glob.as_deref(), "search.symbols")?;

        let mut found = Vec::new();
        for file in &files {
            self.ensure_active()?;
            let Some(language) = language_for_path(&file.relative) else {
                continue;
            };
            if !self.collaborators.parser.supports(language) {
                continue;
            }
            let Some(content) = self.read_walked(file) else {
                continue;
            };
            let parsed = match self.collaborators.parser.parse(&content, language) {
                Ok(parsed) => parsed,
                Err(error) => {
                    debug!(path = %file.relative, %error, "skipping unparsable file");
                    continue;
                }
            };
            for symbol in parsed.symbols {
                if !symbol.name.to_lowercase().contains(&query) {
                    continue;
                }
                let symbol_kind = serde_json::to_value(symbol.kind).unwrap_or(Value::Null);
                if let Some(kind) = &kind
                    && symbol_kind.as_str() != Some(kind.as_str())
                {
                    continue;
                }
                found.push(json!({
                    "name": symbol.name,
                    "kind": symbol_kind,
                    "path": file.relative,
                    "line": symbol.line,
                    "signature": symbol.signature,
                }));
                if found.len() >= limit {
                    return Ok(Value::Array(found));
                }
            }
        }
        Ok(Value::Array(found))
    }

    pub(super) fn search_files(&self, args: &Args) -> Result<Value, SdkError> {
        let query = args.string(0, "query")?.to_lowercase();
        let options: SearchOptions = args.options(1)?;
        let limit = self.result_limit(options.max_results);
        let files = self.candidate_files(options.glob.as_deref(), "search.files")?;
        let found: Vec<Value> = files
            .into_iter()
            .filter(|file| {
                let name = file.relative.rsplit('/').next().unwrap_or(&file.relative);
                name.to_lowercase().contains(&query)
            })
            .take(limit)
            .map(|file| Value::String(file.relative))
            .collect();
        Ok(Value::Array(found))
    }
}

fn clip_line(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(MAX_LINE_CHARS) {
        Some((cut, _)) => format!("{}...", trimmed.get(..cut).unwrap_or_default()),
        None => trimmed.to_string(),
    }
}
