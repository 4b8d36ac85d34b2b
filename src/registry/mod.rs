//! Tool registration and lazy instantiation.
//!
//! Build plans address platform tools by identifier. The registry is built
//! once per run from a static table of built-in specs plus any user-supplied
//! custom specs; identifier collisions fail at construction, before any
//! build action runs. Each tool is constructed at most once, on first use,
//! and reused for the rest of the run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::android::{AndroidTool, ReportError};
use crate::context::BuildContext;
use crate::issue::IssueError;
use crate::toolchain::ToolchainConfig;
use crate::xcode::{XcodeError, XcodeTool};

/// Names already taken by the build context API surface. A tool identifier
/// may not shadow them.
const RESERVED_NAMES: &[&str] = &[
    "add_issue",
    "add_artifacts",
    "issues",
    "artifacts",
    "work_directory",
    "source_directory",
    "action_executed",
    "tool",
];

/// Errors from registry construction and lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("you cannot have a tool named {0:?}: the name is taken by a build context capability")]
    ReservedName(String),

    #[error("two tool definitions declare the identifier {0:?}")]
    DuplicateName(String),

    #[error("no tool registered under the identifier {0:?}")]
    UnknownTool(String),
}

/// Errors surfaced by tool actions.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("this tool does not support {action}")]
    Unsupported { action: &'static str },

    #[error("{action} requires {field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error(transparent)]
    Xcode(#[from] XcodeError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Issue(#[from] IssueError),
}

/// One build-action request from a plan step.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Project or workspace path, relative to the source directory.
    pub project: PathBuf,
    /// Build scheme, for tools that require one.
    pub scheme: Option<String>,
    /// Test destinations, in run order.
    pub destinations: Vec<String>,
}

impl ActionRequest {
    /// The scheme, or a missing-field error for `action`.
    pub fn require_scheme(&self, action: &'static str) -> Result<&str, ToolError> {
        self.scheme
            .as_deref()
            .ok_or(ToolError::MissingField {
                action,
                field: "scheme",
            })
    }
}

/// The closed capability surface a platform tool implements.
///
/// Actions a tool does not support fail with [`ToolError::Unsupported`]; a
/// custom tool overrides only the actions it provides.
pub trait Tool: std::fmt::Debug {
    /// Select a configured toolchain version for subsequent actions.
    fn select_toolchain(&mut self, _version: &str) -> Result<(), ToolError> {
        Err(ToolError::Unsupported {
            action: "use_toolchain",
        })
    }

    /// Run the analysis action and convert its findings into issues.
    fn analyze(
        &mut self,
        _ctx: &mut BuildContext,
        _request: &ActionRequest,
    ) -> Result<(), ToolError> {
        Err(ToolError::Unsupported { action: "analyze" })
    }

    /// Run the test action for every requested destination.
    fn test(&mut self, _ctx: &mut BuildContext, _request: &ActionRequest) -> Result<(), ToolError> {
        Err(ToolError::Unsupported { action: "test" })
    }

    /// Run the archive action and register the resulting artifacts.
    fn archive(
        &mut self,
        _ctx: &mut BuildContext,
        _request: &ActionRequest,
    ) -> Result<(), ToolError> {
        Err(ToolError::Unsupported { action: "archive" })
    }
}

/// Everything a tool constructor may draw on. Loaded once at process start
/// and injected here rather than read lazily from a fixed location.
#[derive(Debug)]
pub struct ToolSetup {
    pub toolchains: ToolchainConfig,
}

/// A named tool constructor.
pub struct ToolSpec {
    pub name: &'static str,
    pub build: fn(&ToolSetup) -> Box<dyn Tool>,
}

/// The built-in platform tools.
pub fn builtin_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "xcode",
            build: |setup| Box::new(XcodeTool::new(setup.toolchains.clone())),
        },
        ToolSpec {
            name: "android",
            build: |_| Box::new(AndroidTool::new()),
        },
    ]
}

/// Registry of tool constructors and their lazily built singleton instances.
#[derive(Debug)]
pub struct ToolRegistry {
    setup: ToolSetup,
    specs: HashMap<String, fn(&ToolSetup) -> Box<dyn Tool>>,
    instances: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Build a registry from the built-in specs plus `custom` user-supplied
    /// specs. Fails fast on identifier collisions.
    pub fn new(setup: ToolSetup, custom: Vec<ToolSpec>) -> Result<Self, RegistryError> {
        let mut specs = HashMap::new();
        for spec in builtin_specs().into_iter().chain(custom) {
            if RESERVED_NAMES.contains(&spec.name) {
                return Err(RegistryError::ReservedName(spec.name.to_string()));
            }
            if specs.insert(spec.name.to_string(), spec.build).is_some() {
                return Err(RegistryError::DuplicateName(spec.name.to_string()));
            }
        }
        Ok(Self {
            setup,
            specs,
            instances: HashMap::new(),
        })
    }

    /// Fetch the singleton instance for `name`, constructing it on first use.
    pub fn get(&mut self, name: &str) -> Result<&mut dyn Tool, RegistryError> {
        match self.instances.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_mut()),
            Entry::Vacant(entry) => {
                let build = self
                    .specs
                    .get(name)
                    .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
                Ok(entry.insert(build(&self.setup)).as_mut())
            }
        }
    }
}
