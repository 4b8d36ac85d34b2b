//! The Xcode platform tool.
//!
//! Drives xcodebuild actions (analyze, test, archive) against a project or
//! workspace, streaming the tool's log to disk while classifying each line,
//! and interpreting the structured reports and output trees the tool leaves
//! behind.

mod analyzer;
mod archive;
mod diagnostics;

pub use archive::{ArchiveAssembler, ArchiveError};
pub use diagnostics::{Diagnostic, DiagnosticExtractor};

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use thiserror::Error;

use crate::context::BuildContext;
use crate::issue::IssueError;
use crate::registry::{ActionRequest, Tool, ToolError};
use crate::shell::{self, ShellError};
use crate::toolchain::{ToolchainConfig, ToolchainError, ToolchainSelector, DEFAULT_KEY};

/// SDK used for on-device actions (analyze, archive).
const DEVICE_SDK: &str = "iphoneos";

/// SDK used for simulator test runs.
const SIMULATOR_SDK: &str = "iphonesimulator";

/// How many log lines to surface when an invocation fails.
const LOG_TAIL_LINES: usize = 200;

/// Errors from xcodebuild invocations and their aftermath.
#[derive(Debug, Error)]
pub enum XcodeError {
    #[error("unknown project type for {}", .0.display())]
    UnknownProjectType(PathBuf),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error("an error was found while building the archive")]
    ArchiveHasErrors,

    #[error("unknown failure ({exit_code}) happened while running xcodebuild")]
    UnknownFailure { exit_code: i32 },

    #[error("test run for destination {destination:?} failed: {source}")]
    DestinationFailed {
        destination: String,
        source: Box<XcodeError>,
    },

    #[error("failed to read analyzer report {}: {source}", .path.display())]
    AnalyzerReport {
        path: PathBuf,
        source: plist::Error,
    },

    #[error("bad report pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Parameters of one xcodebuild invocation beyond project and scheme.
#[derive(Debug)]
struct Invocation {
    action: &'static str,
    sdk: &'static str,
    destination: Option<String>,
    archive_path: Option<PathBuf>,
}

impl Invocation {
    fn new(action: &'static str, sdk: &'static str) -> Self {
        Self {
            action,
            sdk,
            destination: None,
            archive_path: None,
        }
    }

    fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    fn with_archive_path(mut self, archive_path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(archive_path.into());
        self
    }
}

/// The Xcode tool: one instance per run, holding the loaded toolchain
/// configuration and the currently selected toolchain version.
#[derive(Debug)]
pub struct XcodeTool {
    toolchains: ToolchainConfig,
    selected: ToolchainSelector,
}

impl XcodeTool {
    pub fn new(toolchains: ToolchainConfig) -> Self {
        Self {
            toolchains,
            selected: ToolchainSelector::Default,
        }
    }

    /// Resolve the selected toolchain and run one xcodebuild invocation,
    /// streaming its log and classifying diagnostics. On failure the tail of
    /// the log is surfaced for the operator before the error propagates.
    fn xcodebuild(
        &self,
        ctx: &mut BuildContext,
        project: &Path,
        scheme: &str,
        invocation: Invocation,
    ) -> Result<(), XcodeError> {
        let root = self.toolchains.resolve(&self.selected)?;
        let xcodebuild_path = root
            .join("Contents")
            .join("Developer")
            .join("usr")
            .join("bin")
            .join("xcodebuild");
        if !xcodebuild_path.exists() {
            return Err(ToolchainError::MissingExecutable(xcodebuild_path).into());
        }

        let mut args: Vec<String> = Vec::new();
        match project.extension().and_then(|e| e.to_str()) {
            Some("xcodeproj") => {
                args.push("-project".to_string());
                args.push(project.display().to_string());
            }
            Some("xcworkspace") => {
                args.push("-workspace".to_string());
                args.push(project.display().to_string());
            }
            _ => return Err(XcodeError::UnknownProjectType(project.to_path_buf())),
        }
        args.push("-scheme".to_string());
        args.push(scheme.to_string());
        args.push("-sdk".to_string());
        args.push(invocation.sdk.to_string());
        args.push("-derivedDataPath".to_string());
        args.push(ctx.work_directory().display().to_string());
        if let Some(archive_path) = &invocation.archive_path {
            args.push("-archivePath".to_string());
            args.push(archive_path.display().to_string());
        }
        if let Some(destination) = &invocation.destination {
            args.push("-destination".to_string());
            args.push(destination.clone());
        }
        args.push(invocation.action.to_string());

        let log_path = ctx.work_directory().join(format!(
            "xcodebuild-{}.log",
            Utc::now().format("%Y%m%d-%H%M%S%3f")
        ));

        let result = self.run_logged(ctx, &xcodebuild_path, &args, &log_path);
        if result.is_err() && log_path.exists() {
            eprintln!(
                "an error occurred - displaying the {} last lines of the log",
                LOG_TAIL_LINES
            );
            if let Ok(lines) = shell::tail_lines(&log_path, LOG_TAIL_LINES) {
                for line in lines {
                    eprintln!("{line}");
                }
            }
        }
        result
    }

    fn run_logged(
        &self,
        ctx: &mut BuildContext,
        command: &Path,
        args: &[String],
        log_path: &Path,
    ) -> Result<(), XcodeError> {
        let mut log = BufWriter::new(File::create(log_path)?);
        writeln!(log, "running {} {}", command.display(), args.join(" "))?;
        eprintln!("redirecting output to {}", log_path.display());

        let mut extractor = DiagnosticExtractor::new();
        let mut emitted = Vec::new();
        let mut log_error: Option<io::Error> = None;
        let source_directory = ctx.source_directory().to_path_buf();

        let exit_code = shell::stream_lines(command, args, &source_directory, |stream, line| {
            if let Err(e) = writeln!(log, "{}: {}", stream.tag(), line) {
                if log_error.is_none() {
                    log_error = Some(e);
                }
            }
            if let Some(diagnostic) = extractor.process_line(stream, line) {
                emitted.push(diagnostic);
            }
        })?;
        if let Some(diagnostic) = extractor.flush() {
            emitted.push(diagnostic);
        }
        log.flush()?;
        if let Some(e) = log_error {
            return Err(e.into());
        }

        for diagnostic in emitted {
            ctx.add_issue(diagnostic.into_issue())?;
        }

        // Any real build failure shows up as at least one classified
        // diagnostic; a bare non-zero exit has to be escalated on its own.
        if exit_code != 0 && !extractor.new_error_found() {
            return Err(XcodeError::UnknownFailure { exit_code });
        }
        Ok(())
    }
}

impl Tool for XcodeTool {
    fn select_toolchain(&mut self, version: &str) -> Result<(), ToolError> {
        if version == DEFAULT_KEY {
            self.selected = ToolchainSelector::Default;
            return Ok(());
        }
        if !self.toolchains.contains(version) {
            return Err(ToolError::Xcode(XcodeError::Toolchain(
                ToolchainError::NotConfigured {
                    version: version.to_string(),
                    path: self.toolchains.path().to_path_buf(),
                },
            )));
        }
        self.selected = ToolchainSelector::Version(version.to_string());
        Ok(())
    }

    fn analyze(&mut self, ctx: &mut BuildContext, request: &ActionRequest) -> Result<(), ToolError> {
        let scheme = request.require_scheme("analyze")?.to_string();
        ctx.mark_action_executed();

        self.xcodebuild(
            ctx,
            &request.project,
            &scheme,
            Invocation::new("analyze", DEVICE_SDK),
        )?;

        let basename = project_basename(&request.project)?;
        for report_path in analyzer::find_reports(ctx.work_directory(), &basename)? {
            for issue in analyzer::parse_report(&report_path)? {
                ctx.add_issue(issue).map_err(XcodeError::from)?;
            }
        }
        Ok(())
    }

    fn test(&mut self, ctx: &mut BuildContext, request: &ActionRequest) -> Result<(), ToolError> {
        let scheme = request.require_scheme("test")?.to_string();
        if request.destinations.is_empty() {
            return Err(ToolError::MissingField {
                action: "test",
                field: "destinations",
            });
        }
        ctx.mark_action_executed();

        // One destination failing must not keep the others from running;
        // the first failure still propagates once every destination ran.
        let mut first_failure: Option<XcodeError> = None;
        for destination in &request.destinations {
            reset_simulators();
            let result = self.xcodebuild(
                ctx,
                &request.project,
                &scheme,
                Invocation::new("test", SIMULATOR_SDK).with_destination(destination.clone()),
            );
            reset_simulators();

            if let Err(source) = result {
                eprintln!("test run failed for destination {destination}: {source}");
                if first_failure.is_none() {
                    first_failure = Some(XcodeError::DestinationFailed {
                        destination: destination.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }
        match first_failure {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    fn archive(&mut self, ctx: &mut BuildContext, request: &ActionRequest) -> Result<(), ToolError> {
        let scheme = request.require_scheme("archive")?.to_string();
        ctx.mark_action_executed();

        let basename = project_basename(&request.project)?;
        let archive_path = ctx.work_directory().join(format!("{basename}.xcarchive"));
        self.xcodebuild(
            ctx,
            &request.project,
            &scheme,
            Invocation::new("archive", DEVICE_SDK).with_archive_path(&archive_path),
        )?;

        // Never package a broken archive.
        if ctx.error_found() {
            return Err(ToolError::Xcode(XcodeError::ArchiveHasErrors));
        }

        let package_path = ctx.work_directory().join(format!("{basename}.ipa"));
        let assembler = ArchiveAssembler::new(&archive_path, ctx.work_directory());
        let artifacts = assembler
            .assemble(&package_path)
            .map_err(XcodeError::from)?;
        ctx.add_artifacts(artifacts);
        Ok(())
    }
}

/// File stem of the project or workspace path.
fn project_basename(project: &Path) -> Result<String, XcodeError> {
    project
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| XcodeError::UnknownProjectType(project.to_path_buf()))
}

/// Shut down any running simulators so each test destination starts from a
/// known state. Shutting down an already-stopped device set is not an error
/// worth surfacing.
fn reset_simulators() {
    let _ = Command::new("xcrun")
        .args(["simctl", "shutdown", "all"])
        .output();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_context(dir: &TempDir) -> BuildContext {
        let work = dir.path().join("work");
        let source = dir.path().join("source");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::create_dir_all(&source).unwrap();
        BuildContext::new(work, source).unwrap()
    }

    fn make_tool(dir: &TempDir) -> XcodeTool {
        let path = dir.path().join("toolchains.toml");
        std::fs::write(
            &path,
            format!(
                "default = \"16.2\"\n\"16.2\" = {:?}\n",
                dir.path().join("Xcode.app").display().to_string()
            ),
        )
        .unwrap();
        XcodeTool::new(ToolchainConfig::load(&path).unwrap())
    }

    fn request(project: &str, scheme: Option<&str>) -> ActionRequest {
        ActionRequest {
            project: PathBuf::from(project),
            scheme: scheme.map(str::to_string),
            destinations: Vec::new(),
        }
    }

    #[test]
    fn test_project_basename() {
        assert_eq!(
            project_basename(Path::new("ios/App.xcodeproj")).unwrap(),
            "App"
        );
        assert_eq!(
            project_basename(Path::new("App.xcworkspace")).unwrap(),
            "App"
        );
    }

    #[test]
    fn test_select_toolchain_unconfigured_version_fails() {
        let dir = TempDir::new().unwrap();
        let mut tool = make_tool(&dir);

        let err = tool.select_toolchain("99.0").unwrap_err();
        assert!(matches!(
            err,
            ToolError::Xcode(XcodeError::Toolchain(ToolchainError::NotConfigured { .. }))
        ));
    }

    #[test]
    fn test_select_toolchain_configured_version() {
        let dir = TempDir::new().unwrap();
        let mut tool = make_tool(&dir);

        tool.select_toolchain("16.2").unwrap();
        assert_eq!(
            tool.selected,
            ToolchainSelector::Version("16.2".to_string())
        );
    }

    #[test]
    fn test_select_toolchain_default_keyword() {
        let dir = TempDir::new().unwrap();
        let mut tool = make_tool(&dir);
        tool.select_toolchain("16.2").unwrap();

        tool.select_toolchain("default").unwrap();
        assert_eq!(tool.selected, ToolchainSelector::Default);
    }

    #[test]
    fn test_analyze_requires_scheme() {
        let dir = TempDir::new().unwrap();
        let mut ctx = make_context(&dir);
        let mut tool = make_tool(&dir);

        let err = tool
            .analyze(&mut ctx, &request("App.xcodeproj", None))
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::MissingField {
                action: "analyze",
                field: "scheme"
            }
        ));
        assert!(!ctx.action_executed());
    }

    #[test]
    fn test_test_requires_destinations() {
        let dir = TempDir::new().unwrap();
        let mut ctx = make_context(&dir);
        let mut tool = make_tool(&dir);

        let err = tool
            .test(&mut ctx, &request("App.xcodeproj", Some("App")))
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::MissingField {
                action: "test",
                field: "destinations"
            }
        ));
    }

    #[test]
    fn test_unknown_project_type_rejected_before_invocation() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(
            dir.path()
                .join("Xcode.app/Contents/Developer/usr/bin"),
        )
        .unwrap();
        std::fs::write(
            dir.path()
                .join("Xcode.app/Contents/Developer/usr/bin/xcodebuild"),
            "",
        )
        .unwrap();

        let mut ctx = make_context(&dir);
        let mut tool = make_tool(&dir);

        let err = tool
            .analyze(&mut ctx, &request("App.vcxproj", Some("App")))
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Xcode(XcodeError::UnknownProjectType(_))
        ));
    }

    #[test]
    fn test_analyze_marks_action_even_when_toolchain_missing() {
        let dir = TempDir::new().unwrap();
        let mut ctx = make_context(&dir);
        let mut tool = make_tool(&dir);

        let err = tool
            .analyze(&mut ctx, &request("App.xcodeproj", Some("App")))
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Xcode(XcodeError::Toolchain(ToolchainError::MissingOnDisk(_)))
        ));
        assert!(ctx.action_executed());
    }
}
