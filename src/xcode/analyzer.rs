//! Clang static-analyzer report extraction.
//!
//! An analyze action leaves one plist bundle per analyzed source file under
//! the derived-data tree. Each bundle carries a file table and a diagnostics
//! list; diagnostics reference files by table index. Bundles without a file
//! table or with no diagnostics are skipped.

use std::path::{Path, PathBuf};

use globset::Glob;
use serde::Deserialize;
use walkdir::WalkDir;

use super::XcodeError;
use crate::issue::{Issue, IssueKind};

#[derive(Debug, Deserialize)]
struct AnalyzerReport {
    clang_version: Option<String>,
    #[serde(default)]
    files: Vec<PathBuf>,
    #[serde(default)]
    diagnostics: Vec<AnalyzerDiagnostic>,
}

#[derive(Debug, Deserialize)]
struct AnalyzerDiagnostic {
    description: String,
    location: DiagnosticLocation,
}

#[derive(Debug, Deserialize)]
struct DiagnosticLocation {
    file: usize,
    line: u32,
    col: u32,
}

/// Find the analyzer bundles a build of `project_basename` wrote under
/// `work_directory`, in path order.
pub fn find_reports(
    work_directory: &Path,
    project_basename: &str,
) -> Result<Vec<PathBuf>, XcodeError> {
    let pattern = format!(
        "Build/Intermediates/{}.build/**/StaticAnalyzer/**/*.plist",
        project_basename
    );
    let matcher = Glob::new(&pattern)?.compile_matcher();

    let mut reports = Vec::new();
    for entry in WalkDir::new(work_directory)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(work_directory) else {
            continue;
        };
        if matcher.is_match(relative) {
            reports.push(entry.path().to_path_buf());
        }
    }
    reports.sort();
    Ok(reports)
}

/// Parse one analyzer bundle into `static_analysis` issues, resolving each
/// diagnostic's file index through the bundle's file table.
pub fn parse_report(path: &Path) -> Result<Vec<Issue>, XcodeError> {
    let report: AnalyzerReport =
        plist::from_file(path).map_err(|source| XcodeError::AnalyzerReport {
            path: path.to_path_buf(),
            source,
        })?;

    if report.clang_version.is_none() || report.files.is_empty() || report.diagnostics.is_empty() {
        return Ok(Vec::new());
    }

    let mut issues = Vec::new();
    for diagnostic in report.diagnostics {
        let mut issue = Issue::new(IssueKind::StaticAnalysis, diagnostic.description)
            .on_line(diagnostic.location.line)
            .at_column(diagnostic.location.col);
        if let Some(file) = report.files.get(diagnostic.location.file) {
            issue = issue.at(file.clone());
        }
        issues.push(issue);
    }
    Ok(issues)
}
