//! Scoped temporary paths.
//!
//! Every temporary file or directory a run creates is owned by a
//! [`ScratchPath`], which removes it when dropped: on normal return, early
//! return, error propagation or unwinding.

use crate::context::BuildContext;
use crate::error::{ErrorExt, Result};
use crate::utils::fs::remove_path_best_effort;
use std::path::{Path, PathBuf};

/// A path removed when the guard is dropped.
#[derive(Debug)]
pub struct ScratchPath {
    path: PathBuf,
    label: &'static str,
}

impl ScratchPath {
    /// Create an empty file `<dir>/<prefix>-<uuid><suffix>`.
    pub fn new_file(dir: &Path, prefix: &str, suffix: &str, label: &'static str) -> Result<Self> {
        let path = dir.join(format!("{}-{}{}", prefix, uuid::Uuid::new_v4(), suffix));
        std::fs::File::create(&path).fs_context("creating temp file", &path)?;
        log::debug!("created {} {}", label, path.display());
        Ok(Self { path, label })
    }

    /// Create an empty directory `<dir>/<prefix>-<uuid>`.
    pub fn new_dir(dir: &Path, prefix: &str, label: &'static str) -> Result<Self> {
        let path = dir.join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).fs_context("creating temp dir", &path)?;
        log::debug!("created {} {}", label, path.display());
        Ok(Self { path, label })
    }

    /// Take ownership of a path that may or may not exist yet.
    pub fn adopt(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }

    /// Guarded path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchPath {
    fn drop(&mut self) {
        log::info!("cleaning up {} {}", self.label, self.path.display());
        remove_path_best_effort(&self.path);
    }
}

/// Temporary resources of one pipeline run.
///
/// Fields drop in declaration order, so the build root is always removed
/// last.
#[derive(Debug)]
pub struct RunScratch {
    /// Side-channel result file handed to the build tool
    pub property_file: ScratchPath,
    /// Directory the packaging stage deposits extra artifacts into
    pub extra_artifacts: ScratchPath,
    /// The run's scratch build tree
    pub build_root: ScratchPath,
}

impl RunScratch {
    /// Allocate the property file and extras directory under `temp_dir`
    /// and take ownership of the context's build root.
    pub fn allocate(ctx: &BuildContext, temp_dir: &Path) -> Result<Self> {
        let build_root = ScratchPath::adopt(&ctx.build_root, "build root");
        let property_file =
            ScratchPath::new_file(temp_dir, "AntProperties", ".property", "property file")?;
        let extra_artifacts = ScratchPath::new_dir(temp_dir, "ExtraArtifacts", "extra artifacts")?;
        Ok(Self {
            property_file,
            extra_artifacts,
            build_root,
        })
    }
}
