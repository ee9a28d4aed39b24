//! Command-line arguments.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ctxkit", version, about = "Run scripts against a read-only capability SDK in a bounded sandbox")]
pub struct Cli {
    /// Config file; defaults to ./ctxkit.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a script and print the tool response.
    Exec(ExecArgs),
    /// Run only the security analyzer and print its verdict.
    Check(SourceArgs),
    /// Print the `code_execute` tool definition.
    Schema,
}

/// Where the script comes from. Falls back to stdin.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Inline script source.
    #[arg(long, short = 'c', conflicts_with = "file")]
    pub code: Option<String>,

    /// Read the script from a file.
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: Option<PathBuf>,
}

impl SourceArgs {
    pub fn read(&self) -> Result<String> {
        let source = match (&self.code, &self.file) {
            (Some(code), _) => code.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read script from {}", path.display()))?,
            (None, None) => {
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .context("Failed to read script from stdin")?;
                buffer
            }
        };
        if source.trim().is_empty() {
            bail!("No script given: pass --code, --file or pipe it on stdin");
        }
        Ok(source)
    }
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Sandbox root; defaults to the current directory.
    #[arg(long, short = 'w', value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Timeout in milliseconds, clamped to the configured bounds.
    #[arg(long, short = 't', value_name = "MS")]
    pub timeout: Option<u64>,

    /// Print the full execution result as JSON instead of the tool response.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_exec_options() {
        let cli = Cli::try_parse_from([
            "ctxkit", "exec", "--code", "1 + 1", "--workdir", "/tmp", "--timeout", "2000", "--json",
        ])
        .unwrap();
        let Commands::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.source.code.as_deref(), Some("1 + 1"));
        assert_eq!(args.timeout, Some(2000));
        assert!(args.json);
    }

    #[test]
    fn code_and_file_are_exclusive() {
        let parsed = Cli::try_parse_from(["ctxkit", "check", "--code", "1", "--file", "a.js"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn scripts_can_come_from_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let script = temp.child("survey.js");
        script.write_str("ctx.utils.countTokens('abc')").unwrap();
        let source = SourceArgs {
            code: None,
            file: Some(script.path().to_path_buf()),
        };
        assert_eq!(source.read().unwrap(), "ctx.utils.countTokens('abc')");
    }

    #[test]
    fn blank_scripts_are_refused() {
        let source = SourceArgs {
            code: Some("   ".to_string()),
            file: None,
        };
        assert!(source.read().is_err());
    }
}
