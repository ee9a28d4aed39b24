//! The capability SDK exposed to scripts as `ctx`.
//!
//! [`CapabilityBridge`] is created per execution, bound to one canonical
//! working directory, and answers every `ctx.*` call. All operations are
//! read-only; the only subprocess is `git`, restricted to a read-only
//! subcommand allowlist.

mod analyze;
mod args;
mod code;
mod compress;
mod error;
mod files;
mod git;
mod pipeline;
mod search;
mod surface;
mod utils;
mod walk;

pub use error::SdkError;
pub use pipeline::{TEMPLATE_NAMES, TemplateCache};
pub use surface::{Namespace, SdkFunction, SdkHost};

use crate::compression::CompressorRegistry;
use crate::tree_sitter::{AstParser, TreeSitterParser};
use args::Args;
use ctxkit_config::SdkLimits;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Long-lived, read-only services shared by every bridge.
#[derive(Clone)]
pub struct Collaborators {
    pub parser: Arc<dyn AstParser>,
    pub compressors: Arc<CompressorRegistry>,
    pub templates: Arc<TemplateCache>,
}

impl Collaborators {
    pub fn new(limits: &SdkLimits) -> Self {
        Self {
            parser: Arc::new(TreeSitterParser),
            compressors: Arc::new(CompressorRegistry::default()),
            templates: Arc::new(TemplateCache::new(limits.template_ttl())),
        }
    }
}

/// Per-execution implementation of [`SdkHost`].
pub struct CapabilityBridge {
    /// Working directory as supplied, used for error sanitizing.
    working_dir: PathBuf,
    /// Canonical working directory every path is checked against.
    root: PathBuf,
    limits: SdkLimits,
    collaborators: Collaborators,
    cancel: CancellationToken,
    runtime: Handle,
}

impl CapabilityBridge {
    /// Bind a bridge to `working_dir`, which must exist and be a directory.
    pub fn new(
        working_dir: &Path,
        limits: SdkLimits,
        collaborators: Collaborators,
        cancel: CancellationToken,
        runtime: Handle,
    ) -> Result<Self, SdkError> {
        let root = std::fs::canonicalize(working_dir).map_err(|error| {
            SdkError::Other(anyhow::anyhow!(
                "working directory {} is not accessible: {error}",
                working_dir.display()
            ))
        })?;
        if !root.is_dir() {
            return Err(SdkError::Other(anyhow::anyhow!(
                "working directory {} is not a directory",
                working_dir.display()
            )));
        }
        Ok(Self {
            working_dir: working_dir.to_path_buf(),
            root,
            limits,
            collaborators,
            cancel,
            runtime,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limits(&self) -> &SdkLimits {
        &self.limits
    }

    fn dispatch(&self, args: Args) -> Result<Value, SdkError> {
        use SdkFunction::*;
        match args.function() {
            CompressAuto | CompressLogs | CompressDiff | CompressSemantic => self.compress(&args),
            CodeParse => self.code_parse(&args),
            CodeExtract => self.code_extract(&args),
            CodeSkeleton => self.code_skeleton(&args),
            FilesRead => self.files_read(&args),
            FilesExists => self.files_exists(&args),
            FilesGlob => self.files_glob(&args),
            GitDiff => self.git_diff(&args),
            GitLog => self.git_log(&args),
            GitBlame => self.git_blame(&args),
            GitStatus => self.git_status(),
            GitBranch => self.git_branch(),
            SearchGrep => self.search_grep(&args),
            SearchSymbols => self.search_symbols(&args),
            SearchFiles => self.search_files(&args),
            SearchReferences => self.search_references(&args),
            AnalyzeDependencies => self.analyze_dependencies(&args),
            AnalyzeCallGraph => self.analyze_call_graph(&args),
            AnalyzeExports => self.analyze_exports(&args),
            AnalyzeStructure => self.analyze_structure(&args),
            PipelineRun => self.pipeline_run(&args),
            PipelineTemplate => self.pipeline_template(&args),
            PipelineTemplates => Ok(pipeline::template_list()),
            UtilsCountTokens => utils::count_tokens(&args),
            UtilsDetectType => utils::detect_type(&args),
            UtilsDetectLanguage => utils::detect_language(&args),
        }
    }

    fn ensure_active(&self) -> Result<(), SdkError> {
        if self.cancel.is_cancelled() {
            Err(SdkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl SdkHost for CapabilityBridge {
    fn call(&self, function: SdkFunction, args: Vec<Value>) -> Result<Value, SdkError> {
        self.ensure_active()?;
        let started = Instant::now();
        let result = self.dispatch(Args::new(function, args));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(function = %function, elapsed_ms, "sdk call completed"),
            Err(error) => debug!(function = %function, elapsed_ms, %error, "sdk call failed"),
        }
        result.map_err(|error| error.sanitized(&self.working_dir))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::OnceLock;
    use tokio::runtime::Runtime;

    pub fn runtime() -> &'static Runtime {
        static RUNTIME: OnceLock<Runtime> = OnceLock::new();
        RUNTIME.get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("test runtime")
        })
    }

    pub fn bridge(dir: &Path) -> CapabilityBridge {
        bridge_with(dir, SdkLimits::default(), CancellationToken::new())
    }

    pub fn bridge_with(dir: &Path, limits: SdkLimits, cancel: CancellationToken) -> CapabilityBridge {
        let collaborators = Collaborators::new(&limits);
        CapabilityBridge::new(dir, limits, collaborators, cancel, runtime().handle().clone())
            .expect("bridge")
    }

    pub fn call(bridge: &CapabilityBridge, function: SdkFunction, args: Vec<Value>) -> Value {
        bridge
            .call(function, args)
            .unwrap_or_else(|error| panic!("{function} failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn errors_are_sanitized_before_leaving_the_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        let error = bridge
            .call(SdkFunction::FilesRead, vec![json!("missing.txt")])
            .unwrap_err();
        let message = error.to_string();
        assert!(error.is_path_rejection());
        assert!(!message.contains(&dir.path().display().to_string()), "{message}");
    }

    #[test]
    fn cancelled_bridge_refuses_calls() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let bridge = bridge_with(dir.path(), SdkLimits::default(), cancel.clone());
        cancel.cancel();
        let error = bridge
            .call(SdkFunction::UtilsCountTokens, vec![json!("abcd")])
            .unwrap_err();
        assert!(matches!(error, SdkError::Cancelled));
    }

    #[test]
    fn missing_working_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let limits = SdkLimits::default();
        let result = CapabilityBridge::new(
            &missing,
            limits.clone(),
            Collaborators::new(&limits),
            CancellationToken::new(),
            runtime().handle().clone(),
        );
        assert!(result.is_err());
    }
}
