//! The Android platform tool.
//!
//! Covers the static-analysis side of Android builds: interpreting the
//! FindBugs defect report the Gradle build leaves in the project tree.

mod findbugs;

pub use findbugs::{parse_report, ReportError, REPORT_FILE};

use crate::context::BuildContext;
use crate::registry::{ActionRequest, Tool, ToolError};

/// The Android tool. Stateless; the report location is a fixed convention of
/// the Gradle build.
#[derive(Debug, Default)]
pub struct AndroidTool;

impl AndroidTool {
    pub fn new() -> Self {
        Self
    }
}

impl Tool for AndroidTool {
    /// Read the FindBugs report of the target project and record one
    /// static-analysis issue per defect.
    fn analyze(&mut self, ctx: &mut BuildContext, request: &ActionRequest) -> Result<(), ToolError> {
        ctx.mark_action_executed();
        let target = ctx.source_directory().join(&request.project);
        for issue in findbugs::parse_report(&target)? {
            ctx.add_issue(issue)?;
        }
        Ok(())
    }
}
