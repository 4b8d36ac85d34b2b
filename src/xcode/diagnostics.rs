//! Streaming extraction of diagnostics from xcodebuild output.
//!
//! xcodebuild reports a compile or link failure as a header line, optionally
//! followed by indented source-context lines:
//!
//! ```text
//! /Users/ci/App/Sources/Login.swift:24:9: error: cannot find 'token' in scope
//!         token.refresh()
//!         ^~~~~
//! ```
//!
//! The extractor groups a header and its continuations into one diagnostic.
//! An instance serves exactly one invocation; the runner checks
//! [`DiagnosticExtractor::new_error_found`] after flushing to decide whether
//! a non-zero exit still needs separate escalation.

use regex_lite::Regex;

use crate::issue::{Issue, IssueKind};
use crate::shell::OutputStream;

/// A diagnostic block recognized in the build log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub description: String,
    pub file_path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Diagnostic {
    /// Convert into an `error`-kind issue.
    pub fn into_issue(self) -> Issue {
        let mut issue = Issue::new(IssueKind::Error, self.description);
        if let Some(path) = self.file_path {
            issue = issue.at(path);
        }
        if let Some(line) = self.line {
            issue = issue.on_line(line);
        }
        if let Some(column) = self.column {
            issue = issue.at_column(column);
        }
        issue
    }
}

/// Per-invocation streaming state machine over `(stream, line)` pairs.
pub struct DiagnosticExtractor {
    header: Regex,
    pending: Option<Diagnostic>,
    new_error_found: bool,
}

impl DiagnosticExtractor {
    pub fn new() -> Self {
        // `/path/File.swift:24:9: error: message`, with the location and the
        // column both optional, or a bare `error: message` line.
        let header = Regex::new(
            r"^(?:(?P<path>/[^:]+):(?P<line>\d+):(?:(?P<column>\d+):)?\s*)?(?:fatal\s+)?error:\s*(?P<message>.+)$",
        )
        .expect("diagnostic header pattern is valid");
        Self {
            header,
            pending: None,
            new_error_found: false,
        }
    }

    /// Feed one output line. Returns a diagnostic when this line closes one:
    /// a new header closes the previous block, and any non-continuation line
    /// closes a pending block.
    pub fn process_line(&mut self, _stream: OutputStream, line: &str) -> Option<Diagnostic> {
        if let Some(captures) = self.header.captures(line) {
            let next = Diagnostic {
                description: captures["message"].to_string(),
                file_path: captures.name("path").map(|m| m.as_str().to_string()),
                line: captures.name("line").and_then(|m| m.as_str().parse().ok()),
                column: captures.name("column").and_then(|m| m.as_str().parse().ok()),
            };
            return self.take_pending(Some(next));
        }
        if let Some(pending) = &mut self.pending {
            if is_continuation(line) {
                pending.description.push('\n');
                pending.description.push_str(line.trim_end());
                return None;
            }
        }
        self.take_pending(None)
    }

    /// Force emission of a still-pending diagnostic at stream end.
    pub fn flush(&mut self) -> Option<Diagnostic> {
        self.take_pending(None)
    }

    /// True iff this invocation emitted at least one diagnostic.
    pub fn new_error_found(&self) -> bool {
        self.new_error_found
    }

    fn take_pending(&mut self, next: Option<Diagnostic>) -> Option<Diagnostic> {
        let emitted = self.pending.take();
        self.pending = next;
        if emitted.is_some() {
            self.new_error_found = true;
        }
        emitted
    }
}

impl Default for DiagnosticExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuation lines carry the indentation xcodebuild uses for source
/// context and caret markers.
fn is_continuation(line: &str) -> bool {
    !line.trim().is_empty() && (line.starts_with(' ') || line.starts_with('\t'))
}
