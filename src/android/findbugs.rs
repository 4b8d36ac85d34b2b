//! FindBugs defect-report extraction.
//!
//! Gradle Android builds write the FindBugs XML report at a fixed location
//! inside the project tree. Each `BugInstance` record becomes one
//! static-analysis issue; `sourcepath` attributes are resolved against the
//! `src/main/java` source-root convention.

use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Document;
use thiserror::Error;

use crate::issue::{Issue, IssueKind};

/// Report location relative to the target project directory.
pub const REPORT_FILE: &str = "build/reports/findbugs/findbugs.xml";

/// Source-root convention the report's `sourcepath` attributes are relative
/// to.
const SOURCE_ROOT: &str = "src/main/java";

/// Errors from report parsing.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot find FindBugs report at {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read FindBugs report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse FindBugs report {}: {source}", .path.display())]
    Xml {
        path: PathBuf,
        source: roxmltree::Error,
    },
}

/// Parse the report under `target_project`, one issue per defect record.
/// A missing report file is an error, not an empty result.
pub fn parse_report(target_project: &Path) -> Result<Vec<Issue>, ReportError> {
    let report_path = target_project.join(REPORT_FILE);
    if !report_path.exists() {
        return Err(ReportError::Missing(report_path));
    }
    let contents = fs::read_to_string(&report_path).map_err(|source| ReportError::Io {
        path: report_path.clone(),
        source,
    })?;
    let document = Document::parse(&contents).map_err(|source| ReportError::Xml {
        path: report_path.clone(),
        source,
    })?;

    let mut issues = Vec::new();
    for bug in document
        .descendants()
        .filter(|node| node.has_tag_name("BugInstance"))
    {
        let message = bug
            .children()
            .find(|node| node.has_tag_name("LongMessage"))
            .and_then(|node| node.text())
            .unwrap_or_default()
            .to_string();
        let source_line = bug
            .children()
            .find(|node| node.has_tag_name("SourceLine"));

        let mut issue = Issue::new(IssueKind::StaticAnalysis, message);
        if let Some(sourcepath) = source_line.and_then(|node| node.attribute("sourcepath")) {
            issue = issue.at(target_project.join(SOURCE_ROOT).join(sourcepath));
        }
        if let Some(start) = source_line
            .and_then(|node| node.attribute("start"))
            .and_then(|start| start.parse::<u32>().ok())
        {
            issue = issue.on_line(start);
        }
        issues.push(issue);
    }
    Ok(issues)
}
