//! Distributable packaging for completed archive builds.
//!
//! The archive output tree is restructured into an app-store-style package:
//! the generated applications directory is linked in as `Payload`, joined by
//! any WatchKitSupport/SwiftSupport subtrees the archive carries, and the
//! staged tree is compressed into one package artifact. Every produced
//! application bundle and debug-symbol bundle is also compressed on its own.
//!
//! Staging uses symbolic links rather than copies; `zip -r` follows links,
//! so the package stores the linked content as real directories.

use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shell::{self, ShellError};

/// Support subtrees placed next to `Payload` when the archive has them.
const SUPPORT_SUBTREES: &[&str] = &["WatchKitSupport", "SwiftSupport"];

/// Bundle extensions that qualify for individual artifacts.
const BUNDLE_EXTENSIONS: &[&str] = &["app", "dSYM"];

/// Errors from package assembly.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive output {} is missing", .0.display())]
    MissingOutput(PathBuf),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Assembles artifacts from one completed archive output tree.
pub struct ArchiveAssembler {
    archive_path: PathBuf,
    work_directory: PathBuf,
}

impl ArchiveAssembler {
    pub fn new(archive_path: impl Into<PathBuf>, work_directory: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            work_directory: work_directory.into(),
        }
    }

    /// Assemble the combined package at `package_path` plus one artifact per
    /// qualifying bundle. Returns every produced artifact path.
    pub fn assemble(&self, package_path: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let staging = self.stage_package()?;
        shell::zip_recursive(&staging, package_path, ".")?;

        let mut artifacts = vec![package_path.to_path_buf()];
        for bundle in self.qualifying_bundles()? {
            artifacts.push(self.compress_bundle(&bundle)?);
        }
        Ok(artifacts)
    }

    /// Build the staging tree: `Payload` linked to the generated
    /// applications directory, support subtrees linked alongside.
    fn stage_package(&self) -> Result<PathBuf, ArchiveError> {
        let applications = self.archive_path.join("Products").join("Applications");
        if !applications.exists() {
            return Err(ArchiveError::MissingOutput(applications));
        }

        let staging = self.work_directory.join("archiving");
        fs::create_dir_all(&staging)?;
        unix_fs::symlink(&applications, staging.join("Payload"))?;
        for subtree in SUPPORT_SUBTREES {
            let source = self.archive_path.join(subtree);
            if source.exists() {
                unix_fs::symlink(&source, staging.join(subtree))?;
            }
        }
        Ok(staging)
    }

    /// Application and debug-symbol bundles the archive produced, filtered
    /// by extension, in path order.
    fn qualifying_bundles(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut bundles = Vec::new();
        for dir in [
            self.archive_path.join("dSYMs"),
            self.archive_path.join("Products").join("Applications"),
        ] {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                    continue;
                };
                if BUNDLE_EXTENSIONS.contains(&extension) {
                    bundles.push(path);
                }
            }
        }
        bundles.sort();
        Ok(bundles)
    }

    fn compress_bundle(&self, bundle: &Path) -> Result<PathBuf, ArchiveError> {
        let name = bundle
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArchiveError::MissingOutput(bundle.to_path_buf()))?;
        let zip_path = self.work_directory.join(format!("{name}.zip"));
        let parent = bundle.parent().unwrap_or(&self.work_directory);
        shell::zip_recursive(parent, &zip_path, name)?;
        Ok(zip_path)
    }
}
