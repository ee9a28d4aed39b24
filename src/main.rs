//! ctxkit - run short scripts against a read-only capability SDK.
//!
//! Thin binary over `ctxkit-core`: loads configuration, installs logging and
//! runs one request per invocation.

use anyhow::{Context, Result};
use clap::Parser;
use ctxkit_config::CtxkitConfig;
use ctxkit_core::{SandboxExecutor, ToolResponse, analyze_code, definition};
use std::process::ExitCode;

mod cli;

use cli::{Cli, Commands, ExecArgs, SourceArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    initialize_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&definition())?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check(source) => check(&source),
        Commands::Exec(args) => {
            let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
            let config = CtxkitConfig::load(cli.config.as_deref(), &cwd)
                .context("Failed to load configuration")?;
            exec(&config, args, cwd).await
        }
    }
}

/// `RUST_LOG` wins; otherwise only warnings. Logs go to stderr so stdout
/// carries nothing but the response.
fn initialize_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(err) = init_result {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }
}

fn check(source: &SourceArgs) -> Result<ExitCode> {
    let code = source.read()?;
    let verdict = analyze_code(&code);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(if verdict.safe {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn exec(config: &CtxkitConfig, args: ExecArgs, cwd: std::path::PathBuf) -> Result<ExitCode> {
    let code = args.source.read()?;
    let working_dir = args.workdir.unwrap_or(cwd);
    let executor = SandboxExecutor::new(config);
    let context = executor.context(&working_dir, args.timeout);
    let result = executor.execute(&code, &context).await;
    let failed = result.is_error();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let response = ToolResponse::from(result);
        tracing::debug!(
            execution_time_ms = response.stats.execution_time_ms,
            tokens_used = response.stats.tokens_used,
            "tool response ready"
        );
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
