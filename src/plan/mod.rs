//! Build plans.
//!
//! A plan is the scripted surface that drives a build context: a TOML step
//! list interpreted against the fixed tool API, rather than arbitrary code
//! evaluated in-process. Each step names a tool, an action, and the
//! action's parameters. The raw file's SHA-256 digest is recorded for run
//! provenance.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::context::{BuildContext, BuildError, BuildScript};
use crate::registry::{ActionRequest, ToolError, ToolRegistry};

/// Errors from plan loading.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("cannot find build plan {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read build plan {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse build plan {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("build plan {} has no steps", .0.display())]
    Empty(PathBuf),
}

/// The closed set of actions a step may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    UseToolchain,
    Analyze,
    Test,
    Archive,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::UseToolchain => "use_toolchain",
            Action::Analyze => "analyze",
            Action::Test => "test",
            Action::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// One plan step.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Tool identifier, resolved through the registry.
    pub tool: String,
    pub action: Action,

    /// Project or workspace path, relative to the source directory.
    #[serde(default)]
    pub project: Option<PathBuf>,

    #[serde(default)]
    pub scheme: Option<String>,

    /// Test destinations, run strictly in list order.
    #[serde(default)]
    pub destinations: Vec<String>,

    /// Toolchain version, for `use_toolchain` steps.
    #[serde(default)]
    pub version: Option<String>,
}

impl Step {
    fn to_request(&self, action: &'static str) -> Result<ActionRequest, ToolError> {
        let project = self.project.clone().ok_or(ToolError::MissingField {
            action,
            field: "project",
        })?;
        Ok(ActionRequest {
            project,
            scheme: self.scheme.clone(),
            destinations: self.destinations.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    step: Vec<Step>,
}

/// A parsed build plan plus the provenance digest of its source file.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub path: PathBuf,
    /// SHA-256 of the raw plan bytes.
    pub digest: String,
    pub steps: Vec<Step>,
}

impl BuildPlan {
    /// Load and validate a plan file.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        if !path.exists() {
            return Err(PlanError::Missing(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = hex::encode(Sha256::digest(&bytes));
        let contents = String::from_utf8_lossy(&bytes);
        let raw: RawPlan = toml::from_str(&contents).map_err(|source| PlanError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.step.is_empty() {
            return Err(PlanError::Empty(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            digest,
            steps: raw.step,
        })
    }
}

impl BuildScript for BuildPlan {
    /// Interpret the steps in order. The first failing step aborts the
    /// remainder of the plan.
    fn run(&self, ctx: &mut BuildContext, tools: &mut ToolRegistry) -> Result<(), BuildError> {
        for (index, step) in self.steps.iter().enumerate() {
            eprintln!("step {}/{}: {} {}", index + 1, self.steps.len(), step.tool, step.action);
            let tool = tools.get(&step.tool)?;
            match step.action {
                Action::UseToolchain => {
                    let version = step.version.as_deref().ok_or(ToolError::MissingField {
                        action: "use_toolchain",
                        field: "version",
                    })?;
                    tool.select_toolchain(version)?;
                }
                Action::Analyze => {
                    let request = step.to_request("analyze")?;
                    tool.analyze(ctx, &request)?;
                }
                Action::Test => {
                    let request = step.to_request("test")?;
                    tool.test(ctx, &request)?;
                }
                Action::Archive => {
                    let request = step.to_request("archive")?;
                    tool.archive(ctx, &request)?;
                }
            }
        }
        Ok(())
    }
}
