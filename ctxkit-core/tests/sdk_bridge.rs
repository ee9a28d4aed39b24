//! `ctx.*` exercised end to end through the executor.

use ctxkit_core::{ErrorKind, ExecutionResult, SandboxContext, execute_sandbox};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("src/main.ts"),
        "import { helper } from './util';\nimport fs from 'fs';\n\nexport function main() {\n  return helper();\n}\n",
    )
    .unwrap();
    std::fs::write(
        root.join("src/util.ts"),
        "// TODO: cache results\nexport function helper() {\n  return 42;\n}\n",
    )
    .unwrap();
    std::fs::write(root.join("notes.md"), "FIXME tighten wording\n").unwrap();
    dir
}

async fn run(root: &Path, code: &str) -> ExecutionResult {
    execute_sandbox(code, &SandboxContext::new(root)).await
}

async fn run_json(root: &Path, code: &str) -> Value {
    let result = run(root, code).await;
    assert!(result.success, "{:?}", result.error);
    serde_json::from_str(result.output.as_deref().unwrap_or("null")).unwrap()
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(["-c", "init.defaultBranch=main", "-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(root)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

fn git_project() -> Option<TempDir> {
    if which::which("git").is_err() {
        eprintln!("git not found on PATH; skipping");
        return None;
    }
    let dir = project();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "initial import"]);
    Some(dir)
}

#[tokio::test(flavor = "multi_thread")]
async fn search_and_analyze_namespaces_answer_from_the_workspace() {
    let dir = project();
    let value = run_json(
        dir.path(),
        r#"
        const deps = ctx.analyze.dependencies('src/main.ts');
        const hits = ctx.search.grep('helper', { glob: 'src/*.ts' });
        const exports = ctx.analyze.exports('src/util.ts').exports.map((e) => e.name);
        ({ internal: deps.internal, external: deps.external, hits: hits.length, exports })
        "#,
    )
    .await;
    assert_eq!(
        value,
        json!({"internal": ["./util"], "external": ["fs"], "hits": 3, "exports": ["helper"]})
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_templates_are_reachable() {
    let dir = project();
    let todos = run_json(dir.path(), "ctx.pipeline.template('find-todos')").await;
    let kinds: Vec<&str> = todos
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|todo| todo["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["FIXME", "TODO"]);
    let names = run_json(dir.path(), "ctx.pipeline.templates()").await;
    assert_eq!(names, json!(["summarize", "find-todos", "file-list", "largest-files"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn sdk_errors_can_be_caught_by_scripts() {
    let dir = project();
    let value = run_json(
        dir.path(),
        "let message; try { ctx.files.read('missing.txt') } catch (e) { message = e.message } message",
    )
    .await;
    let message = value.as_str().unwrap();
    assert!(message.contains("does not exist"), "{message}");
    assert!(!message.contains(&dir.path().display().to_string()), "{message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_members_are_runtime_errors() {
    let dir = project();
    let result = run(dir.path(), "ctx.files.write('x', 'y')").await;
    assert_eq!(result.error_kind, Some(ErrorKind::RuntimeError));
}

#[tokio::test(flavor = "multi_thread")]
async fn git_status_and_log_report_repository_state() {
    let Some(dir) = git_project() else {
        return;
    };
    std::fs::write(dir.path().join("src/util.ts"), "export function helper() {\n  return 7;\n}\n").unwrap();
    std::fs::write(dir.path().join("new.txt"), "fresh\n").unwrap();
    let value = run_json(
        dir.path(),
        r#"
        const status = ctx.git.status();
        const log = ctx.git.log({ limit: 5 });
        const branches = ctx.git.branch();
        ({ status, messages: log.map((c) => c.message), current: branches.current })
        "#,
    )
    .await;
    assert_eq!(value["status"]["branch"], json!("main"));
    assert_eq!(value["status"]["modified"], json!(["src/util.ts"]));
    assert_eq!(value["status"]["untracked"], json!(["new.txt"]));
    assert_eq!(value["messages"], json!(["initial import"]));
    assert_eq!(value["current"], json!("main"));
}

#[tokio::test(flavor = "multi_thread")]
async fn git_diff_and_blame_read_history() {
    let Some(dir) = git_project() else {
        return;
    };
    std::fs::write(dir.path().join("notes.md"), "FIXME tighten wording\nsecond line\n").unwrap();
    let diff = run(dir.path(), "ctx.git.diff({ path: 'notes.md' })").await;
    assert!(diff.success, "{:?}", diff.error);
    assert!(diff.output.unwrap().contains("+second line"));

    let blame = run_json(dir.path(), "ctx.git.blame('src/util.ts', { startLine: 1, endLine: 2 })").await;
    assert_eq!(blame.as_array().map(Vec::len), Some(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn git_rejects_paths_outside_the_workspace() {
    let Some(dir) = git_project() else {
        return;
    };
    let result = run(dir.path(), "ctx.git.blame('../elsewhere.rs')").await;
    assert_eq!(result.error_kind, Some(ErrorKind::PathRejected));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn linked_directories_outside_the_workspace_are_not_walked() {
    let dir = project();
    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("hostsecret.txt"), "TOPSECRET-OUTSIDE\n").unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

    for code in [
        "ctx.search.grep('TOPSECRET', { glob: 'link/*' })",
        "ctx.files.glob('link/*')",
        "ctx.pipeline.template('find-todos', { glob: 'link/*' })",
    ] {
        let result = run(dir.path(), code).await;
        assert_eq!(result.error_kind, Some(ErrorKind::PathRejected), "{code}: {result:?}");
        assert!(!result.display_text().contains("TOPSECRET"), "{code}");
    }

    let everywhere = run(dir.path(), "ctx.search.grep('TOPSECRET')").await;
    assert_eq!(everywhere.output.as_deref(), Some("[]"));
}

#[tokio::test(flavor = "multi_thread")]
async fn git_revisions_cannot_read_committed_blobs() {
    let Some(dir) = git_project() else {
        return;
    };
    std::fs::write(dir.path().join(".env"), "API_KEY=committed-secret-123\n").unwrap();
    git(dir.path(), &["add", "-f", ".env"]);
    git(dir.path(), &["commit", "-q", "-m", "add settings"]);

    for code in [
        "ctx.git.diff({ ref: 'HEAD:README.md..HEAD:.env' })",
        "ctx.git.log({ ref: 'HEAD:.env' })",
    ] {
        let result = run(dir.path(), code).await;
        assert!(!result.success, "{code}: {result:?}");
        assert!(!result.display_text().contains("committed-secret"), "{code}");
    }
}
