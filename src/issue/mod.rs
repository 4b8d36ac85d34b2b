//! Issue model and per-run aggregation.
//!
//! Every diagnostic produced during a build run - a classified log line, a
//! static-analyzer plist record, an XML defect record - is normalized into an
//! [`Issue`] and accumulated in one [`IssueStore`]. The store merges
//! duplicates so aggregation is idempotent and independent of which build
//! actions ran, or in what order.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from issue validation.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("an issue requires a non-empty description")]
    MissingDescription,

    #[error("an issue kind has to be one of warning, static_analysis, error; got {0:?}")]
    UnknownKind(String),
}

/// Severity class of an issue.
///
/// Ordered by severity: `Error` outranks `StaticAnalysis` outranks `Warning`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Warning,
    StaticAnalysis,
    Error,
}

impl IssueKind {
    /// The wire/report spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Warning => "warning",
            IssueKind::StaticAnalysis => "static_analysis",
            IssueKind::Error => "error",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = IssueError;

    fn from_str(s: &str) -> Result<Self, IssueError> {
        match s {
            "warning" => Ok(IssueKind::Warning),
            "static_analysis" => Ok(IssueKind::StaticAnalysis),
            "error" => Ok(IssueKind::Error),
            other => Err(IssueError::UnknownKind(other.to_string())),
        }
    }
}

/// One detected problem, with an optional source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub description: String,

    /// Relative to the source root whenever the original path was absolute
    /// and under it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Issue {
    /// Create an issue without a source location.
    pub fn new(kind: IssueKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            file_path: None,
            line: None,
            column: None,
        }
    }

    /// Attach a file path.
    pub fn at(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Attach a line number.
    pub fn on_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach a column number.
    pub fn at_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// The merge identity: two issues with equal signatures are one record.
    fn signature(&self) -> (Option<&PathBuf>, Option<u32>, Option<u32>, &str) {
        (
            self.file_path.as_ref(),
            self.line,
            self.column,
            self.description.as_str(),
        )
    }
}

/// Accumulated issues for one build run.
///
/// Issues are deduplicated on `(file_path, line, column, description)`; a
/// duplicate keeps the stronger kind. Records are never removed once stored.
#[derive(Debug)]
pub struct IssueStore {
    source_root: PathBuf,
    issues: Vec<Issue>,
}

impl IssueStore {
    /// Create an empty store. Absolute issue paths under `source_root` are
    /// stored relative to it.
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            issues: Vec::new(),
        }
    }

    /// Add an issue, merging it into an existing record with the same
    /// signature.
    ///
    /// Merge rule: an existing `error` is never replaced; otherwise an
    /// incoming `error` or `static_analysis` replaces a weaker record of the
    /// same signature, and anything else keeps the earlier record.
    pub fn add(&mut self, mut issue: Issue) -> Result<(), IssueError> {
        if issue.description.trim().is_empty() {
            return Err(IssueError::MissingDescription);
        }
        if let Some(path) = issue.file_path.take() {
            issue.file_path = Some(if path.is_absolute() {
                match path.strip_prefix(&self.source_root) {
                    Ok(relative) => relative.to_path_buf(),
                    Err(_) => path,
                }
            } else {
                path
            });
        }

        let existing = self
            .issues
            .iter()
            .position(|stored| stored.signature() == issue.signature());
        let Some(index) = existing else {
            self.issues.push(issue);
            return Ok(());
        };

        let stored = &self.issues[index];
        if stored.kind == IssueKind::Error || stored.kind == issue.kind {
            return Ok(());
        }
        if matches!(issue.kind, IssueKind::Error | IssueKind::StaticAnalysis) {
            self.issues[index] = issue;
        }
        Ok(())
    }

    /// Snapshot of all stored issues, in insertion order.
    pub fn all(&self) -> &[Issue] {
        &self.issues
    }

    /// True iff any stored issue is `error`-kind.
    pub fn has_error(&self) -> bool {
        self.issues.iter().any(|issue| issue.kind == IssueKind::Error)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IssueStore {
        IssueStore::new("/work/source")
    }

    fn located(kind: IssueKind) -> Issue {
        Issue::new(kind, "possible null dereference")
            .at("App/Model.m")
            .on_line(42)
            .at_column(7)
    }

    #[test]
    fn test_kind_ordering() {
        assert!(IssueKind::Error > IssueKind::StaticAnalysis);
        assert!(IssueKind::StaticAnalysis > IssueKind::Warning);
    }

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in [IssueKind::Warning, IssueKind::StaticAnalysis, IssueKind::Error] {
            assert_eq!(kind.as_str().parse::<IssueKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_parse_unknown() {
        let err = "fatal".parse::<IssueKind>().unwrap_err();
        assert!(matches!(err, IssueError::UnknownKind(k) if k == "fatal"));
    }

    #[test]
    fn test_missing_description_rejected() {
        let mut store = store();
        let err = store.add(Issue::new(IssueKind::Warning, "  ")).unwrap_err();
        assert!(matches!(err, IssueError::MissingDescription));
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_keeps_stronger_kind() {
        let mut store = store();
        store.add(located(IssueKind::Warning)).unwrap();
        store.add(located(IssueKind::Error)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].kind, IssueKind::Error);
    }

    #[test]
    fn test_duplicate_weaker_kind_is_ignored() {
        let mut store = store();
        store.add(located(IssueKind::StaticAnalysis)).unwrap();
        store.add(located(IssueKind::Warning)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].kind, IssueKind::StaticAnalysis);
    }

    #[test]
    fn test_existing_error_never_replaced() {
        let mut store = store();
        store.add(located(IssueKind::Error)).unwrap();
        store.add(located(IssueKind::StaticAnalysis)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].kind, IssueKind::Error);
    }

    #[test]
    fn test_static_analysis_overwrites_warning() {
        let mut store = store();
        store.add(located(IssueKind::Warning)).unwrap();
        store.add(located(IssueKind::StaticAnalysis)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].kind, IssueKind::StaticAnalysis);
    }

    #[test]
    fn test_different_locations_are_distinct() {
        let mut store = store();
        store.add(located(IssueKind::Warning)).unwrap();
        store.add(located(IssueKind::Warning).on_line(43)).unwrap();

        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_absolute_path_made_relative_to_source_root() {
        let mut store = store();
        store
            .add(Issue::new(IssueKind::Error, "boom").at("/work/source/App/Main.swift"))
            .unwrap();

        assert_eq!(
            store.all()[0].file_path.as_deref(),
            Some(std::path::Path::new("App/Main.swift"))
        );
    }

    #[test]
    fn test_absolute_path_outside_source_root_kept() {
        let mut store = store();
        store
            .add(Issue::new(IssueKind::Error, "boom").at("/tmp/elsewhere.swift"))
            .unwrap();

        assert_eq!(
            store.all()[0].file_path.as_deref(),
            Some(std::path::Path::new("/tmp/elsewhere.swift"))
        );
    }

    #[test]
    fn test_normalized_paths_merge() {
        let mut store = store();
        store
            .add(Issue::new(IssueKind::Warning, "unused variable").at("App/Main.swift"))
            .unwrap();
        store
            .add(Issue::new(IssueKind::Error, "unused variable").at("/work/source/App/Main.swift"))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].kind, IssueKind::Error);
    }

    #[test]
    fn test_has_error() {
        let mut store = store();
        assert!(!store.has_error());
        store.add(Issue::new(IssueKind::Warning, "meh")).unwrap();
        assert!(!store.has_error());
        store.add(Issue::new(IssueKind::Error, "boom")).unwrap();
        assert!(store.has_error());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut store = store();
        store.add(Issue::new(IssueKind::Warning, "first")).unwrap();
        store.add(Issue::new(IssueKind::Error, "second")).unwrap();
        store.add(Issue::new(IssueKind::Warning, "third")).unwrap();

        let descriptions: Vec<_> = store.all().iter().map(|i| i.description.as_str()).collect();
        assert_eq!(descriptions, ["first", "second", "third"]);
    }

    #[test]
    fn test_issue_kind_serde_rejects_unknown() {
        let parsed: Result<IssueKind, _> = serde_json::from_str("\"fatal\"");
        assert!(parsed.is_err());
    }
}
