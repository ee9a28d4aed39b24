use ctxkit_core::{ErrorKind, SandboxContext, SandboxExecutor, execute_sandbox, execute_tool};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "API_KEY=super-secret-value\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo\n\nhello world\n").unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/lib.rs"),
        "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    )
    .unwrap();
    dir
}

#[tokio::test(flavor = "multi_thread")]
async fn count_tokens_returns_a_positive_number() {
    let dir = workspace();
    let executor = SandboxExecutor::default();
    let response = execute_tool(
        &executor,
        dir.path(),
        json!({"code": "return ctx.utils.countTokens('hello world')"}),
    )
    .await
    .unwrap();
    assert!(!response.is_error);
    let count: u64 = response.content[0].text.parse().unwrap();
    assert!(count > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn reading_env_file_is_rejected_without_leaking_content() {
    let dir = workspace();
    let executor = SandboxExecutor::default();
    let response = execute_tool(
        &executor,
        dir.path(),
        json!({"code": "return ctx.files.read('.env')"}),
    )
    .await
    .unwrap();
    let text = &response.content[0].text;
    assert!(response.is_error);
    assert!(text.contains("sensitive file"), "{text}");
    assert!(!text.contains("super-secret-value"), "{text}");
    assert!(!text.contains(&dir.path().display().to_string()), "{text}");
}

#[tokio::test(flavor = "multi_thread")]
async fn path_rejections_are_classified() {
    let dir = workspace();
    let context = SandboxContext::new(dir.path());
    let result = execute_sandbox("ctx.files.read('../outside.txt')", &context).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::PathRejected));
}

#[tokio::test(flavor = "multi_thread")]
async fn timers_are_blocked_before_execution() {
    let dir = workspace();
    let context = SandboxContext::new(dir.path());
    let result = execute_sandbox("setTimeout(() => {}, 10); 1", &context).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::SecurityBlocked));
    assert_eq!(
        result.blocked_patterns,
        vec!["setTimeout: timers is not allowed".to_string()]
    );
    assert!(result.output.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn infinite_loop_times_out_near_the_requested_bound() {
    let dir = workspace();
    let context = SandboxContext::new(dir.path()).with_timeout_ms(Some(1_000));
    let started = Instant::now();
    let result = execute_sandbox("while (true) {}", &context).await;
    let elapsed = started.elapsed();
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(result.error.as_deref(), Some("Execution timed out after 1000ms"));
    assert!(!result.warnings.is_empty());
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn requested_timeouts_are_clamped_to_the_floor() {
    let dir = workspace();
    let context = SandboxContext::new(dir.path()).with_timeout_ms(Some(10));
    let result = execute_sandbox("for (;;) {}", &context).await;
    assert_eq!(result.error.as_deref(), Some("Execution timed out after 1000ms"));
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_output_is_truncated_but_successful() {
    let dir = workspace();
    let mut context = SandboxContext::new(dir.path());
    context.max_output_tokens = 50;
    let result = execute_sandbox("'x'.repeat(1000)", &context).await;
    assert!(result.success);
    assert!(result.truncated);
    assert_eq!(result.error_kind, Some(ErrorKind::OutputTooLarge));
    let output = result.output.unwrap();
    assert!(output.ends_with("[Output truncated: 250 tokens exceeds limit of 50]"), "{output}");
}

#[tokio::test(flavor = "multi_thread")]
async fn runtime_errors_are_reported_and_sanitized() {
    let dir = workspace();
    let context = SandboxContext::new(dir.path());
    let result = execute_sandbox(
        &format!("throw new Error('failed in {}')", dir.path().display()),
        &context,
    )
    .await;
    assert_eq!(result.error_kind, Some(ErrorKind::RuntimeError));
    let error = result.error.unwrap();
    assert!(error.contains("<workdir>"), "{error}");
    assert!(!error.contains(&dir.path().display().to_string()), "{error}");
}

#[tokio::test(flavor = "multi_thread")]
async fn memory_limit_stops_runaway_allocation() {
    let dir = workspace();
    let mut context = SandboxContext::new(dir.path());
    context.memory_limit_bytes = 1024 * 1024;
    let result = execute_sandbox(
        "const chunks = []; for (let i = 0; i < 1000000; i++) { chunks.push('x'.repeat(1024)); } chunks.length",
        &context,
    )
    .await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::RuntimeError));
    assert!(result.error.unwrap().contains("memory limit"));
}

#[tokio::test(flavor = "multi_thread")]
async fn scripts_compose_several_sdk_calls() {
    let dir = workspace();
    let context = SandboxContext::new(dir.path());
    let result = execute_sandbox(
        r#"
        const files = ctx.files.glob('src/*.rs');
        const summary = files.map((path) => {
            const source = ctx.files.read(path);
            const parsed = ctx.code.parse(source, 'rust');
            return { path, symbols: parsed.symbols.map((s) => s.name) };
        });
        summary
        "#,
        &context,
    )
    .await;
    assert!(result.success, "{:?}", result.error);
    let value: serde_json::Value = serde_json::from_str(result.output.as_deref().unwrap()).unwrap();
    assert_eq!(value, json!([{"path": "src/lib.rs", "symbols": ["add"]}]));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_executions_are_independent() {
    let first = workspace();
    let second = workspace();
    std::fs::write(second.path().join("only-here.txt"), "second").unwrap();
    let executor = SandboxExecutor::default();
    let code = "ctx.files.exists('only-here.txt')";
    let first_context = executor.context(first.path(), None);
    let second_context = executor.context(second.path(), None);
    let (a, b) = tokio::join!(
        executor.execute(code, &first_context),
        executor.execute(code, &second_context)
    );
    assert_eq!(a.output.as_deref(), Some("false"));
    assert_eq!(b.output.as_deref(), Some("true"));
}
