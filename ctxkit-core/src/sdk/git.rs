//! Read-only git queries. Every invocation goes through [`CapabilityBridge::git`],
//! which enforces the subcommand allowlist and argument checks before a
//! process is spawned.

use super::args::{Args, bounded_count};
use super::{CapabilityBridge, SdkError};
use anyhow::Context;
use ctxkit_commons::{check_path, relative_display};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const ALLOWED_SUBCOMMANDS: &[&str] = &["diff", "log", "blame", "status", "branch"];
const BLOCKED_SUBCOMMANDS: &[&str] = &["push", "fetch", "pull", "clone", "remote", "submodule"];
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '$', '`', '>', '<', '\n', '\r', '\0'];
const GLOBAL_FLAGS: &[&str] = &[
    "--no-pager",
    "-c",
    "color.ui=never",
    "-c",
    "core.fsmonitor=false",
];
const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%aI%x1f%s";
const DEFAULT_LOG_LIMIT: usize = 10;
const MAX_LOG_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DiffOptions {
    staged: bool,
    stat: bool,
    path: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LogOptions {
    limit: Option<usize>,
    path: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BlameOptions {
    start_line: Option<usize>,
    end_line: Option<usize>,
}

fn check_subcommand(subcommand: &str) -> Result<(), SdkError> {
    if BLOCKED_SUBCOMMANDS.contains(&subcommand) {
        return Err(git_error(subcommand, "subcommand is not permitted in the sandbox"));
    }
    if !ALLOWED_SUBCOMMANDS.contains(&subcommand) {
        return Err(git_error(subcommand, "subcommand is not on the read-only allowlist"));
    }
    Ok(())
}

/// Caller-supplied values must not look like options or carry shell syntax.
fn check_argument(subcommand: &str, argument: &str) -> Result<(), SdkError> {
    if argument.is_empty() {
        return Err(git_error(subcommand, "empty argument"));
    }
    if argument.starts_with('-') {
        return Err(git_error(
            subcommand,
            format!("argument '{argument}' must not start with '-'"),
        ));
    }
    if argument.contains(SHELL_METACHARACTERS) {
        return Err(git_error(
            subcommand,
            format!("argument '{}' contains shell metacharacters", argument.escape_debug()),
        ));
    }
    Ok(())
}

/// Operands name revisions only. `rev:path`, `:path` and `:/text` forms
/// would read blobs without the path checks, so a colon is refused.
fn check_revision(subcommand: &str, revision: &str) -> Result<(), SdkError> {
    check_argument(subcommand, revision)?;
    if revision.contains(':') {
        return Err(git_error(
            subcommand,
            format!("revision '{revision}' must not contain ':'; pass file paths through the 'path' option"),
        ));
    }
    Ok(())
}

fn git_error(command: &str, message: impl Into<String>) -> SdkError {
    SdkError::Git {
        command: command.to_string(),
        message: message.into(),
    }
}

async fn git_output(root: PathBuf, subcommand: &'static str, argv: Vec<String>) -> Result<String, SdkError> {
    let mut cmd = Command::new("git");
    cmd.current_dir(&root)
        .env("LC_ALL", "C")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_OPTIONAL_LOCKS", "0")
        .args(GLOBAL_FLAGS)
        .args(&argv)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to execute git {subcommand}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(git_error(subcommand, stderr.trim()));
    }

    let mut stdout = output.stdout;
    let truncated = stdout.len() > MAX_OUTPUT_BYTES;
    stdout.truncate(MAX_OUTPUT_BYTES);
    let mut text = String::from_utf8_lossy(&stdout).into_owned();
    if truncated {
        text.push_str("\n[git output truncated]\n");
    }
    Ok(text)
}

impl CapabilityBridge {
    /// Run `git <subcommand> <flags> <operands> [-- <paths>]` in the sandbox
    /// root. `flags` are fixed by the caller; operands and paths come from
    /// scripts and are checked first.
    fn git(
        &self,
        subcommand: &'static str,
        flags: &[&str],
        operands: Vec<String>,
        paths: Vec<String>,
    ) -> Result<String, SdkError> {
        check_subcommand(subcommand)?;
        for revision in &operands {
            check_revision(subcommand, revision)?;
        }
        for path in &paths {
            check_argument(subcommand, path)?;
        }
        self.ensure_active()?;

        let mut argv: Vec<String> = vec![subcommand.to_string()];
        argv.extend(flags.iter().map(|flag| flag.to_string()));
        argv.extend(operands);
        if !paths.is_empty() {
            argv.push("--".to_string());
            argv.extend(paths);
        }

        let cancel = self.cancel.clone();
        let root = self.root.clone();
        self.runtime.block_on(async move {
            tokio::select! {
                result = git_output(root, subcommand, argv) => result,
                _ = cancel.cancelled() => Err(SdkError::Cancelled),
            }
        })
    }

    /// Validate a script-supplied path and express it relative to the root.
    fn git_path(&self, path: &str) -> Result<String, SdkError> {
        let resolved = check_path(path, &self.root)?;
        Ok(relative_display(&resolved, &self.root))
    }

    pub(super) fn git_diff(&self, args: &Args) -> Result<Value, SdkError> {
        let options: DiffOptions = args.options(0)?;
        let mut flags = vec!["--no-ext-diff", "--no-textconv", "--no-color"];
        if options.staged {
            flags.push("--cached");
        }
        if options.stat {
            flags.push("--stat");
        }
        let operands = options.reference.into_iter().collect();
        let paths = options
            .path
            .as_deref()
            .map(|path| self.git_path(path))
            .transpose()?
            .into_iter()
            .collect();
        Ok(Value::String(self.git("diff", &flags, operands, paths)?))
    }

    pub(super) fn git_log(&self, args: &Args) -> Result<Value, SdkError> {
        let options: LogOptions = args.options(0)?;
        let limit = bounded_count(options.limit, DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT);
        let count = format!("--max-count={limit}");
        let flags = ["--no-color", LOG_FORMAT, count.as_str()];
        let operands = options.reference.into_iter().collect();
        let paths = options
            .path
            .as_deref()
            .map(|path| self.git_path(path))
            .transpose()?
            .into_iter()
            .collect();
        let output = self.git("log", &flags, operands, paths)?;
        Ok(Value::Array(parse_log(&output)))
    }

    pub(super) fn git_blame(&self, args: &Args) -> Result<Value, SdkError> {
        let path = self.git_path(args.string(0, "path")?)?;
        let options: BlameOptions = args.options(1)?;
        let range = match (options.start_line, options.end_line) {
            (None, None) => None,
            (start, end) => {
                let start = start.unwrap_or(1);
                if start == 0 || end.is_some_and(|end| end < start) {
                    return Err(args.invalid("line range must satisfy 1 <= startLine <= endLine"));
                }
                Some(match end {
                    Some(end) => format!("-L{start},{end}"),
                    None => format!("-L{start},"),
                })
            }
        };
        let mut flags = vec!["--porcelain"];
        if let Some(range) = range.as_deref() {
            flags.push(range);
        }
        let output = self.git("blame", &flags, Vec::new(), vec![path])?;
        Ok(Value::Array(parse_blame(&output)))
    }

    pub(super) fn git_status(&self) -> Result<Value, SdkError> {
        let output = self.git(
            "status",
            &["--porcelain=v1", "--branch", "--untracked-files=normal"],
            Vec::new(),
            Vec::new(),
        )?;
        Ok(parse_status(&output))
    }

    pub(super) fn git_branch(&self) -> Result<Value, SdkError> {
        let output = self.git("branch", &["--list", "--no-color"], Vec::new(), Vec::new())?;
        Ok(parse_branches(&output))
    }
}

fn parse_log(output: &str) -> Vec<Value> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, '\x1f');
            let hash = fields.next()?;
            let author = fields.next()?;
            let date = fields.next()?;
            let message = fields.next().unwrap_or_default();
            Some(json!({
                "hash": hash,
                "author": author,
                "date": date,
                "message": message,
            }))
        })
        .collect()
}

fn parse_blame(output: &str) -> Vec<Value> {
    let mut authors: HashMap<String, String> = HashMap::new();
    let mut lines = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in output.lines() {
        if let Some(content) = line.strip_prefix('\t') {
            if let Some((hash, number)) = current.take() {
                let author = authors.get(&hash).cloned().unwrap_or_default();
                lines.push(json!({
                    "line": number,
                    "hash": hash,
                    "author": author,
                    "content": content,
                }));
            }
            continue;
        }
        if let Some(author) = line.strip_prefix("author ") {
            if let Some((hash, _)) = &current {
                authors.insert(hash.clone(), author.to_string());
            }
            continue;
        }
        let mut parts = line.split(' ');
        if let (Some(hash), Some(_), Some(final_line)) = (parts.next(), parts.next(), parts.next())
            && hash.len() >= 40
            && hash.bytes().all(|byte| byte.is_ascii_hexdigit())
            && let Ok(number) = final_line.parse::<usize>()
        {
            current = Some((hash.to_string(), number));
        }
    }
    lines
}

fn parse_status(output: &str) -> Value {
    let mut branch = Value::Null;
    let mut staged = Vec::new();
    let mut modified = Vec::new();
    let mut untracked = Vec::new();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            branch = Value::String(branch_from_header(header));
            continue;
        }
        if line.len() < 4 {
            continue;
        }
        let (code, path) = line.split_at(3);
        let path = path.rsplit(" -> ").next().unwrap_or(path).to_string();
        let mut codes = code.chars();
        let index = codes.next().unwrap_or(' ');
        let worktree = codes.next().unwrap_or(' ');
        if index == '?' {
            untracked.push(path);
            continue;
        }
        if index != ' ' {
            staged.push(path.clone());
        }
        if worktree != ' ' {
            modified.push(path);
        }
    }

    json!({
        "branch": branch,
        "staged": staged,
        "modified": modified,
        "untracked": untracked,
    })
}

fn branch_from_header(header: &str) -> String {
    let header = header
        .strip_prefix("No commits yet on ")
        .or_else(|| header.strip_prefix("Initial commit on "))
        .unwrap_or(header);
    if header.starts_with("HEAD (no branch)") {
        return "HEAD".to_string();
    }
    let name = header.split("...").next().unwrap_or(header);
    name.split(" [").next().unwrap_or(name).trim().to_string()
}

fn parse_branches(output: &str) -> Value {
    let mut current = Value::Null;
    let mut branches = Vec::new();
    for line in output.lines() {
        let (is_current, name) = match line.strip_prefix("* ") {
            Some(name) => (true, name.trim()),
            None => (false, line.trim()),
        };
        if name.is_empty() {
            continue;
        }
        let detached = name.starts_with('(');
        if is_current {
            current = Value::String(if detached { "HEAD".to_string() } else { name.to_string() });
        }
        if !detached {
            branches.push(Value::String(name.to_string()));
        }
    }
    json!({ "current": current, "branches": branches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn network_and_unknown_subcommands_are_refused() {
        for subcommand in ["push", "fetch", "pull", "clone", "remote", "submodule"] {
            let error = check_subcommand(subcommand).unwrap_err();
            assert!(error.to_string().contains("not permitted"), "{error}");
        }
        assert!(check_subcommand("config").is_err());
        assert!(check_subcommand("log").is_ok());
    }

    #[test]
    fn arguments_are_screened() {
        assert!(check_argument("diff", "HEAD~2").is_ok());
        assert!(check_argument("diff", "main..feature").is_ok());
        for bad in ["--output=/tmp/x", "-p", "HEAD; rm -rf /", "a|b", "$(id)", "`id`", "a\nb", "x > y"] {
            assert!(check_argument("diff", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn revisions_cannot_name_blobs() {
        assert!(check_revision("diff", "HEAD~1..HEAD").is_ok());
        assert!(check_revision("log", "main@{2}").is_ok());
        for revision in ["HEAD:.env", "HEAD:README.md..HEAD:.env", ":0:secret.txt", ":/fix"] {
            let error = check_revision("diff", revision).unwrap_err();
            assert!(error.to_string().contains("must not contain ':'"), "{error}");
        }
        assert!(check_revision("diff", "--output=x").is_err());
    }

    #[test]
    fn log_records_are_split_on_unit_separators() {
        let output = "abc123\x1fAda\x1f2024-01-02T03:04:05+00:00\x1fFix: a | b\n";
        assert_eq!(
            parse_log(output),
            vec![json!({
                "hash": "abc123",
                "author": "Ada",
                "date": "2024-01-02T03:04:05+00:00",
                "message": "Fix: a | b",
            })]
        );
    }

    #[test]
    fn status_groups_paths() {
        let output = "## main...origin/main [ahead 1]\nM  staged.rs\n M changed.rs\nMM both.rs\n?? new.txt\nR  old.rs -> renamed.rs\n";
        assert_eq!(
            parse_status(output),
            json!({
                "branch": "main",
                "staged": ["staged.rs", "both.rs", "renamed.rs"],
                "modified": ["changed.rs", "both.rs"],
                "untracked": ["new.txt"],
            })
        );
        assert_eq!(branch_from_header("No commits yet on trunk"), "trunk");
        assert_eq!(branch_from_header("HEAD (no branch)"), "HEAD");
    }

    #[test]
    fn branches_mark_current() {
        let output = "  feature\n* main\n";
        assert_eq!(
            parse_branches(output),
            json!({ "current": "main", "branches": ["feature", "main"] })
        );
        let detached = "* (HEAD detached at 1a2b3c)\n  main\n";
        assert_eq!(
            parse_branches(detached),
            json!({ "current": "HEAD", "branches": ["main"] })
        );
    }

    #[test]
    fn porcelain_blame_reuses_authors_for_repeated_commits() {
        let hash = "a".repeat(40);
        let output = format!(
            "{hash} 1 1 2\nauthor Ada\nauthor-mail <ada@example.com>\nfilename lib.rs\n\tfn one() {{}}\n{hash} 2 2\n\tfn two() {{}}\n"
        );
        assert_eq!(
            parse_blame(&output),
            vec![
                json!({"line": 1, "hash": hash, "author": "Ada", "content": "fn one() {}"}),
                json!({"line": 2, "hash": hash, "author": "Ada", "content": "fn two() {}"}),
            ]
        );
    }
}
