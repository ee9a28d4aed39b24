//! The closed set of names reachable through `ctx`.

use super::error::SdkError;
use serde_json::Value;
use std::fmt;

/// Namespaces hanging off `ctx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Compress,
    Code,
    Files,
    Git,
    Search,
    Analyze,
    Pipeline,
    Utils,
}

impl Namespace {
    pub const ALL: [Namespace; 8] = [
        Namespace::Compress,
        Namespace::Code,
        Namespace::Files,
        Namespace::Git,
        Namespace::Search,
        Namespace::Analyze,
        Namespace::Pipeline,
        Namespace::Utils,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Compress => "compress",
            Namespace::Code => "code",
            Namespace::Files => "files",
            Namespace::Git => "git",
            Namespace::Search => "search",
            Namespace::Analyze => "analyze",
            Namespace::Pipeline => "pipeline",
            Namespace::Utils => "utils",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.as_str() == name)
    }

    /// `ctx.pipeline(...)` is itself callable.
    pub fn call_target(self) -> Option<SdkFunction> {
        match self {
            Namespace::Pipeline => Some(SdkFunction::PipelineRun),
            _ => None,
        }
    }

    pub fn functions(self) -> impl Iterator<Item = SdkFunction> {
        SdkFunction::ALL
            .iter()
            .copied()
            .filter(move |function| function.namespace() == self)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every operation the bridge implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkFunction {
    CompressAuto,
    CompressLogs,
    CompressDiff,
    CompressSemantic,
    CodeParse,
    CodeExtract,
    CodeSkeleton,
    FilesRead,
    FilesExists,
    FilesGlob,
    GitDiff,
    GitLog,
    GitBlame,
    GitStatus,
    GitBranch,
    SearchGrep,
    SearchSymbols,
    SearchFiles,
    SearchReferences,
    AnalyzeDependencies,
    AnalyzeCallGraph,
    AnalyzeExports,
    AnalyzeStructure,
    PipelineRun,
    PipelineTemplate,
    PipelineTemplates,
    UtilsCountTokens,
    UtilsDetectType,
    UtilsDetectLanguage,
}

impl SdkFunction {
    pub const ALL: &'static [SdkFunction] = &[
        SdkFunction::CompressAuto,
        SdkFunction::CompressLogs,
        SdkFunction::CompressDiff,
        SdkFunction::CompressSemantic,
        SdkFunction::CodeParse,
        SdkFunction::CodeExtract,
        SdkFunction::CodeSkeleton,
        SdkFunction::FilesRead,
        SdkFunction::FilesExists,
        SdkFunction::FilesGlob,
        SdkFunction::GitDiff,
        SdkFunction::GitLog,
        SdkFunction::GitBlame,
        SdkFunction::GitStatus,
        SdkFunction::GitBranch,
        SdkFunction::SearchGrep,
        SdkFunction::SearchSymbols,
        SdkFunction::SearchFiles,
        SdkFunction::SearchReferences,
        SdkFunction::AnalyzeDependencies,
        SdkFunction::AnalyzeCallGraph,
        SdkFunction::AnalyzeExports,
        SdkFunction::AnalyzeStructure,
        SdkFunction::PipelineRun,
        SdkFunction::PipelineTemplate,
        SdkFunction::PipelineTemplates,
        SdkFunction::UtilsCountTokens,
        SdkFunction::UtilsDetectType,
        SdkFunction::UtilsDetectLanguage,
    ];

    pub fn namespace(self) -> Namespace {
        use SdkFunction::*;
        match self {
            CompressAuto | CompressLogs | CompressDiff | CompressSemantic => Namespace::Compress,
            CodeParse | CodeExtract | CodeSkeleton => Namespace::Code,
            FilesRead | FilesExists | FilesGlob => Namespace::Files,
            GitDiff | GitLog | GitBlame | GitStatus | GitBranch => Namespace::Git,
            SearchGrep | SearchSymbols | SearchFiles | SearchReferences => Namespace::Search,
            AnalyzeDependencies | AnalyzeCallGraph | AnalyzeExports | AnalyzeStructure => {
                Namespace::Analyze
            }
            PipelineRun | PipelineTemplate | PipelineTemplates => Namespace::Pipeline,
            UtilsCountTokens | UtilsDetectType | UtilsDetectLanguage => Namespace::Utils,
        }
    }

    /// Member name under the namespace.
    pub fn member(self) -> &'static str {
        use SdkFunction::*;
        match self {
            CompressAuto => "auto",
            CompressLogs => "logs",
            CompressDiff => "diff",
            CompressSemantic => "semantic",
            CodeParse => "parse",
            CodeExtract => "extract",
            CodeSkeleton => "skeleton",
            FilesRead => "read",
            FilesExists => "exists",
            FilesGlob => "glob",
            GitDiff => "diff",
            GitLog => "log",
            GitBlame => "blame",
            GitStatus => "status",
            GitBranch => "branch",
            SearchGrep => "grep",
            SearchSymbols => "symbols",
            SearchFiles => "files",
            SearchReferences => "references",
            AnalyzeDependencies => "dependencies",
            AnalyzeCallGraph => "callGraph",
            AnalyzeExports => "exports",
            AnalyzeStructure => "structure",
            PipelineRun => "run",
            PipelineTemplate => "template",
            PipelineTemplates => "templates",
            UtilsCountTokens => "countTokens",
            UtilsDetectType => "detectType",
            UtilsDetectLanguage => "detectLanguage",
        }
    }

    pub fn resolve(namespace: Namespace, member: &str) -> Option<Self> {
        namespace.functions().find(|function| function.member() == member)
    }

    /// Dotted name used in logs and error messages, e.g. `files.read`.
    pub fn name(self) -> String {
        match self {
            SdkFunction::PipelineRun => "pipeline".to_string(),
            _ => format!("{}.{}", self.namespace(), self.member()),
        }
    }
}

impl fmt::Display for SdkFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Host side of `ctx`: receives already converted arguments and returns a
/// JSON result. Implementations sanitize their own error text.
pub trait SdkHost {
    fn call(&self, function: SdkFunction, args: Vec<Value>) -> Result<Value, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_function_resolves_through_its_namespace() {
        for function in SdkFunction::ALL {
            assert_eq!(
                SdkFunction::resolve(function.namespace(), function.member()),
                Some(*function)
            );
        }
    }

    #[test]
    fn unknown_members_do_not_resolve() {
        assert_eq!(SdkFunction::resolve(Namespace::Files, "write"), None);
        assert_eq!(SdkFunction::resolve(Namespace::Git, "push"), None);
        assert_eq!(Namespace::from_name("fs"), None);
    }

    #[test]
    fn names_are_dotted() {
        assert_eq!(SdkFunction::AnalyzeCallGraph.name(), "analyze.callGraph");
        assert_eq!(SdkFunction::PipelineRun.name(), "pipeline");
        assert_eq!(Namespace::Pipeline.call_target(), Some(SdkFunction::PipelineRun));
    }
}
