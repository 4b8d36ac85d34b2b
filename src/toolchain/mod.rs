//! Developer-toolchain resolution.
//!
//! A TOML version file maps toolchain version identifiers to installation
//! roots. The `default` entry may name another version key or point directly
//! at a path. The file is loaded once at process start and injected into the
//! tools that need it; when absent it is created with a single default entry
//! derived from the active installation.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Key of the default entry in the version file.
pub const DEFAULT_KEY: &str = "default";

/// Fallback installation root when no active toolchain can be detected.
const FALLBACK_INSTALL_PATH: &str = "/Applications/Xcode.app";

/// Errors from toolchain configuration and resolution.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("toolchain version {version:?} is not configured in {}", .path.display())]
    NotConfigured { version: String, path: PathBuf },

    #[error(
        "either select an explicit toolchain version in the build plan, \
         or set a default entry in the toolchain file"
    )]
    NoDefault,

    #[error("{} does not point to an existing toolchain installation", .0.display())]
    MissingOnDisk(PathBuf),

    #[error("cannot find xcodebuild at {}", .0.display())]
    MissingExecutable(PathBuf),

    #[error("failed to read toolchain file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse toolchain file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Version selector for one invocation. Tools start on `Default` and switch
/// via an explicit plan step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolchainSelector {
    #[default]
    Default,
    Version(String),
}

/// The loaded toolchain version file.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ToolchainConfig {
    /// Load the version file, creating it first with a default entry derived
    /// from the active toolchain when it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self, ToolchainError> {
        if !path.exists() {
            let mut entries = toml::Table::new();
            entries.insert(
                DEFAULT_KEY.to_string(),
                toml::Value::String(detect_active_toolchain()),
            );
            let contents = toml::to_string(&entries).unwrap_or_default();
            fs::write(path, contents).map_err(|source| ToolchainError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Self::load(path)
    }

    /// Load an existing version file.
    pub fn load(path: &Path) -> Result<Self, ToolchainError> {
        let contents = fs::read_to_string(path).map_err(|source| ToolchainError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: BTreeMap<String, String> =
            toml::from_str(&contents).map_err(|source| ToolchainError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Where this configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff `version` has an entry.
    pub fn contains(&self, version: &str) -> bool {
        self.entries.contains_key(version)
    }

    /// Iterate over the configured entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve a selector to an existing installation root.
    ///
    /// `Default` follows the `default` entry, which may name another version
    /// key or a direct path. Explicit versions must be configured.
    pub fn resolve(&self, selector: &ToolchainSelector) -> Result<PathBuf, ToolchainError> {
        let raw = match selector {
            ToolchainSelector::Version(version) => self
                .entries
                .get(version)
                .ok_or_else(|| ToolchainError::NotConfigured {
                    version: version.clone(),
                    path: self.path.clone(),
                })?
                .clone(),
            ToolchainSelector::Default => {
                let default = self.entries.get(DEFAULT_KEY).ok_or(ToolchainError::NoDefault)?;
                match self.entries.get(default) {
                    Some(path) => path.clone(),
                    None => default.clone(),
                }
            }
        };
        let root = PathBuf::from(raw);
        if !root.exists() {
            return Err(ToolchainError::MissingOnDisk(root));
        }
        Ok(root)
    }
}

/// Ask `xcode-select` for the active developer directory; fall back to the
/// standard install location when unavailable.
fn detect_active_toolchain() -> String {
    if let Ok(output) = Command::new("xcode-select").arg("-p").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return path
                    .trim_end_matches("/Contents/Developer")
                    .to_string();
            }
        }
    }
    FALLBACK_INSTALL_PATH.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> ToolchainConfig {
        let path = dir.path().join("toolchains.toml");
        fs::write(&path, contents).unwrap();
        ToolchainConfig::load(&path).unwrap()
    }

    #[test]
    fn test_resolve_default_direct_path() {
        let dir = TempDir::new().unwrap();
        let install = dir.path().join("Xcode.app");
        fs::create_dir(&install).unwrap();

        let config = write_config(
            &dir,
            &format!("default = {:?}\n", install.display().to_string()),
        );
        let resolved = config.resolve(&ToolchainSelector::Default).unwrap();
        assert_eq!(resolved, install);
    }

    #[test]
    fn test_resolve_default_indirection_through_version_key() {
        let dir = TempDir::new().unwrap();
        let install = dir.path().join("Xcode-16.2.app");
        fs::create_dir(&install).unwrap();

        let config = write_config(
            &dir,
            &format!(
                "default = \"16.2\"\n\"16.2\" = {:?}\n",
                install.display().to_string()
            ),
        );
        let resolved = config.resolve(&ToolchainSelector::Default).unwrap();
        assert_eq!(resolved, install);
    }

    #[test]
    fn test_resolve_explicit_version() {
        let dir = TempDir::new().unwrap();
        let install = dir.path().join("Xcode-15.4.app");
        fs::create_dir(&install).unwrap();

        let config = write_config(
            &dir,
            &format!("\"15.4\" = {:?}\n", install.display().to_string()),
        );
        let resolved = config
            .resolve(&ToolchainSelector::Version("15.4".to_string()))
            .unwrap();
        assert_eq!(resolved, install);
    }

    #[test]
    fn test_resolve_unconfigured_version() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "default = \"/nowhere\"\n");

        let err = config
            .resolve(&ToolchainSelector::Version("99.0".to_string()))
            .unwrap_err();
        assert!(matches!(err, ToolchainError::NotConfigured { version, .. } if version == "99.0"));
    }

    #[test]
    fn test_resolve_no_default_entry() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "\"16.2\" = \"/nowhere\"\n");

        let err = config.resolve(&ToolchainSelector::Default).unwrap_err();
        assert!(matches!(err, ToolchainError::NoDefault));
    }

    #[test]
    fn test_resolve_missing_on_disk() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "default = \"/definitely/not/here/Xcode.app\"\n");

        let err = config.resolve(&ToolchainSelector::Default).unwrap_err();
        assert!(matches!(err, ToolchainError::MissingOnDisk(_)));
    }

    #[test]
    fn test_load_or_init_creates_default_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("toolchains.toml");

        let config = ToolchainConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert!(config.contains(DEFAULT_KEY));
    }

    #[test]
    fn test_load_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("toolchains.toml");
        fs::write(&path, "not valid toml [").unwrap();

        let err = ToolchainConfig::load(&path).unwrap_err();
        assert!(matches!(err, ToolchainError::Parse { .. }));
    }
}
