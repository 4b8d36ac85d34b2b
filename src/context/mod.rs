//! Per-run build context.
//!
//! A [`BuildContext`] is the aggregate a build script drives: it owns the
//! issue and artifact stores, the directory configuration, and the record of
//! whether any build action ran. One context serves exactly one run; issue
//! and artifact snapshots are read after the script completes.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::artifact::ArtifactStore;
use crate::issue::{Issue, IssueError, IssueStore};
use crate::registry::{RegistryError, ToolError, ToolRegistry};

/// Context window handed to the review relevance filter: issues within this
/// many lines of a changed region are considered related to the change.
pub const DEFAULT_LINES_AROUND_RELATED: u32 = 20;

/// Errors from context construction and script execution.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("work directory {} does not exist", .0.display())]
    MissingWorkDirectory(PathBuf),

    #[error("source directory {} does not exist", .0.display())]
    MissingSourceDirectory(PathBuf),

    #[error("no action executed")]
    NoActionExecuted,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Issue(#[from] IssueError),
}

/// The per-run aggregate owning issues, artifacts, and run configuration.
#[derive(Debug)]
pub struct BuildContext {
    work_directory: PathBuf,
    source_directory: PathBuf,
    lines_around_related: u32,
    run_id: String,
    issues: IssueStore,
    artifacts: ArtifactStore,
    action_executed: bool,
}

impl BuildContext {
    /// Create a context for one run. Both directories must already exist.
    pub fn new(
        work_directory: impl Into<PathBuf>,
        source_directory: impl Into<PathBuf>,
    ) -> Result<Self, BuildError> {
        let work_directory = work_directory.into();
        if !work_directory.is_dir() {
            return Err(BuildError::MissingWorkDirectory(work_directory));
        }
        let source_directory = source_directory.into();
        if !source_directory.is_dir() {
            return Err(BuildError::MissingSourceDirectory(source_directory));
        }

        let issues = IssueStore::new(source_directory.clone());
        Ok(Self {
            work_directory,
            source_directory,
            lines_around_related: DEFAULT_LINES_AROUND_RELATED,
            run_id: ulid::Ulid::new().to_string(),
            issues,
            artifacts: ArtifactStore::new(),
            action_executed: false,
        })
    }

    /// Override the relevance context window.
    pub fn with_lines_around_related(mut self, lines: u32) -> Self {
        self.lines_around_related = lines;
        self
    }

    pub fn work_directory(&self) -> &Path {
        &self.work_directory
    }

    pub fn source_directory(&self) -> &Path {
        &self.source_directory
    }

    pub fn lines_around_related(&self) -> u32 {
        self.lines_around_related
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record that a build action ran. Every tool action calls this on
    /// entry; a run where nothing does is rejected by [`build_project`].
    pub fn mark_action_executed(&mut self) {
        self.action_executed = true;
    }

    pub fn action_executed(&self) -> bool {
        self.action_executed
    }

    /// Add an issue to the run, applying validation and the merge rule.
    pub fn add_issue(&mut self, issue: Issue) -> Result<(), IssueError> {
        self.issues.add(issue)
    }

    /// Register artifact paths, dropping duplicates.
    pub fn add_artifacts<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.artifacts.add(paths);
    }

    /// True iff any recorded issue is `error`-kind.
    pub fn error_found(&self) -> bool {
        self.issues.has_error()
    }

    /// Snapshot of recorded issues, in post-merge insertion order.
    pub fn issues(&self) -> &[Issue] {
        self.issues.all()
    }

    /// Snapshot of registered artifacts, in first-insertion order.
    pub fn artifacts(&self) -> &[PathBuf] {
        self.artifacts.all()
    }
}

/// A build script: plugin code driving one context through the fixed tool
/// API surface.
pub trait BuildScript {
    fn run(&self, ctx: &mut BuildContext, tools: &mut ToolRegistry) -> Result<(), BuildError>;
}

/// Run `script` against the context, then enforce that at least one build
/// action was executed. A script that completes without running any action
/// is a configuration error, not a silent no-op.
pub fn build_project(
    script: &dyn BuildScript,
    ctx: &mut BuildContext,
    tools: &mut ToolRegistry,
) -> Result<(), BuildError> {
    script.run(ctx, tools)?;
    if !ctx.action_executed() {
        return Err(BuildError::NoActionExecuted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueKind;
    use crate::registry::ToolSetup;
    use crate::toolchain::ToolchainConfig;
    use tempfile::TempDir;

    fn make_context(dir: &TempDir) -> BuildContext {
        let work = dir.path().join("work");
        let source = dir.path().join("source");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::create_dir_all(&source).unwrap();
        BuildContext::new(work, source).unwrap()
    }

    fn make_registry(dir: &TempDir) -> ToolRegistry {
        let path = dir.path().join("toolchains.toml");
        std::fs::write(&path, "default = \"/nowhere\"\n").unwrap();
        ToolRegistry::new(
            ToolSetup {
                toolchains: ToolchainConfig::load(&path).unwrap(),
            },
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_work_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        std::fs::create_dir_all(&source).unwrap();

        let err = BuildContext::new(dir.path().join("absent"), source).unwrap_err();
        assert!(matches!(err, BuildError::MissingWorkDirectory(_)));
    }

    #[test]
    fn test_missing_source_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();

        let err = BuildContext::new(work, dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, BuildError::MissingSourceDirectory(_)));
    }

    #[test]
    fn test_default_lines_around_related() {
        let dir = TempDir::new().unwrap();
        let ctx = make_context(&dir);
        assert_eq!(ctx.lines_around_related(), DEFAULT_LINES_AROUND_RELATED);
    }

    #[test]
    fn test_issue_paths_relative_to_source_directory() {
        let dir = TempDir::new().unwrap();
        let mut ctx = make_context(&dir);
        let absolute = ctx.source_directory().join("App/Main.swift");

        ctx.add_issue(Issue::new(IssueKind::Error, "boom").at(absolute))
            .unwrap();

        assert_eq!(
            ctx.issues()[0].file_path.as_deref(),
            Some(Path::new("App/Main.swift"))
        );
    }

    #[test]
    fn test_script_that_runs_no_action_is_rejected() {
        struct IdleScript;
        impl BuildScript for IdleScript {
            fn run(
                &self,
                _ctx: &mut BuildContext,
                _tools: &mut ToolRegistry,
            ) -> Result<(), BuildError> {
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let mut ctx = make_context(&dir);
        let mut tools = make_registry(&dir);

        let err = build_project(&IdleScript, &mut ctx, &mut tools).unwrap_err();
        assert!(matches!(err, BuildError::NoActionExecuted));
    }

    #[test]
    fn test_script_that_marks_action_passes() {
        struct MarkingScript;
        impl BuildScript for MarkingScript {
            fn run(
                &self,
                ctx: &mut BuildContext,
                _tools: &mut ToolRegistry,
            ) -> Result<(), BuildError> {
                ctx.mark_action_executed();
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let mut ctx = make_context(&dir);
        let mut tools = make_registry(&dir);

        build_project(&MarkingScript, &mut ctx, &mut tools).unwrap();
        assert!(ctx.action_executed());
    }
}
