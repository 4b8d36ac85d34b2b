//! Run reporting.
//!
//! Implements the exit contract of a finished run: no issues is a success,
//! warnings alone are a success with a printed list, and any static-analysis
//! or error issue fails the run. A JSON run report carries the issue and
//! artifact snapshots to downstream consumers such as the review relevance
//! filter.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::BuildContext;
use crate::issue::{Issue, IssueKind};
use crate::plan::BuildPlan;

/// Outcome classification for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No issues at all.
    Clean,
    /// Only warning-kind issues.
    WarningsOnly,
    /// At least one static-analysis or error issue.
    Failed,
}

impl RunOutcome {
    pub fn classify(issues: &[Issue]) -> Self {
        if issues.is_empty() {
            RunOutcome::Clean
        } else if issues.iter().all(|issue| issue.kind == IssueKind::Warning) {
            RunOutcome::WarningsOnly
        } else {
            RunOutcome::Failed
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Clean | RunOutcome::WarningsOnly => 0,
            RunOutcome::Failed => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        *self != RunOutcome::Failed
    }
}

/// Print the issue list and classify the run.
pub fn report(issues: &[Issue]) -> RunOutcome {
    let outcome = RunOutcome::classify(issues);
    match outcome {
        RunOutcome::Clean => println!("great, no issue found"),
        _ => {
            println!("issues found:");
            for issue in issues {
                println!("- {}", format_issue(issue));
            }
            if outcome == RunOutcome::WarningsOnly {
                println!("warnings only - should be fixed but not considered a failure");
            } else {
                println!("exiting in error");
            }
        }
    }
    outcome
}

/// `path:line: description`, omitting location parts that are unknown.
pub fn format_issue(issue: &Issue) -> String {
    let mut prefix = String::new();
    if let Some(path) = &issue.file_path {
        prefix.push_str(&path.display().to_string());
        prefix.push(':');
    }
    if let Some(line) = issue.line {
        prefix.push_str(&line.to_string());
        prefix.push(':');
    }
    if prefix.is_empty() {
        issue.description.clone()
    } else {
        format!("{} {}", prefix, issue.description)
    }
}

/// Serializable snapshot of one completed run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub plan_path: PathBuf,
    pub plan_digest: String,
    /// Context window for the review relevance filter.
    pub lines_around_related: u32,
    pub issues: Vec<Issue>,
    pub artifacts: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(ctx: &BuildContext, plan: &BuildPlan) -> Self {
        Self {
            run_id: ctx.run_id().to_string(),
            created_at: Utc::now(),
            plan_path: plan.path.clone(),
            plan_digest: plan.digest.clone(),
            lines_around_related: ctx.lines_around_related(),
            issues: ctx.issues().to_vec(),
            artifacts: ctx.artifacts().to_vec(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_clean() {
        assert_eq!(RunOutcome::classify(&[]), RunOutcome::Clean);
    }

    #[test]
    fn test_classify_warnings_only() {
        let issues = vec![
            Issue::new(IssueKind::Warning, "one"),
            Issue::new(IssueKind::Warning, "two"),
        ];
        assert_eq!(RunOutcome::classify(&issues), RunOutcome::WarningsOnly);
    }

    #[test]
    fn test_classify_static_analysis_fails() {
        let issues = vec![
            Issue::new(IssueKind::Warning, "one"),
            Issue::new(IssueKind::StaticAnalysis, "two"),
        ];
        assert_eq!(RunOutcome::classify(&issues), RunOutcome::Failed);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Clean.exit_code(), 0);
        assert_eq!(RunOutcome::WarningsOnly.exit_code(), 0);
        assert_eq!(RunOutcome::Failed.exit_code(), 1);
        assert!(RunOutcome::WarningsOnly.is_success());
        assert!(!RunOutcome::Failed.is_success());
    }

    #[test]
    fn test_format_issue_with_location() {
        let issue = Issue::new(IssueKind::Error, "boom")
            .at("App/Main.swift")
            .on_line(12);
        assert_eq!(format_issue(&issue), "App/Main.swift:12: boom");
    }

    #[test]
    fn test_format_issue_without_location() {
        let issue = Issue::new(IssueKind::Warning, "just a note");
        assert_eq!(format_issue(&issue), "just a note");
    }

    #[test]
    fn test_format_issue_path_only() {
        let issue = Issue::new(IssueKind::Warning, "note").at("App/Main.swift");
        assert_eq!(format_issue(&issue), "App/Main.swift: note");
    }
}
