//! File system utilities for staging build outputs.
//!
//! Provides copy operations with automatic directory creation, symlink
//! preservation and path context on every error.

use crate::error::{ErrorExt, ReleaseError, Result};
use std::{io, path::Path};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).await.is_ok() {
        fs::remove_dir_all(path)
            .await
            .fs_context("removing directory", path)?;
    }
    Ok(())
}

/// Removes a file or directory, logging instead of failing.
///
/// A path that does not exist is not an error.
pub fn remove_path_best_effort(path: &Path) {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            log::warn!("cannot inspect {}: {}", path.display(), e);
            return;
        }
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => log::debug!("removed {}", path.display()),
        Err(e) => log::warn!("failed to remove {}: {}", path.display(), e),
    }
}

/// Makes a symbolic link to a directory.
#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(unix)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(windows)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Copies a regular file, creating any parent directories of the
/// destination as necessary. An existing destination is overwritten.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from).await.fs_context("reading", from)?;
    if !meta.is_file() {
        return Err(ReleaseError::Fs {
            context: "copying",
            path: from.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying to", to)?;
    Ok(())
}

/// Recursively copies a directory, preserving symlinks.
///
/// The destination must not exist yet; its parents are created.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from).await.fs_context("reading", from)?;
    if !meta.is_dir() {
        return Err(ReleaseError::Fs {
            context: "copying",
            path: from.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .await
            .fs_context("creating directory", parent)?;
    }

    for entry in walkdir::WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            ReleaseError::Fs {
                context: "walking",
                path,
                source: io::Error::other(e.to_string()),
            }
        })?;
        let rel_path = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ReleaseError::Fs {
                context: "relativizing",
                path: entry.path().to_path_buf(),
                source: io::Error::other(e),
            })?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .await
                .fs_context("reading link", entry.path())?;
            if entry.path().is_dir() {
                symlink_dir(&target, &dest_path).fs_context("creating link", &dest_path)?;
            } else {
                symlink_file(&target, &dest_path).fs_context("creating link", &dest_path)?;
            }
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .await
                .fs_context("creating directory", &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)
                .await
                .fs_context("copying to", &dest_path)?;
        }
    }

    Ok(())
}
