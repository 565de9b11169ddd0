use crate::error::ArchiveError;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tar::HeaderMode;

/// Tar and gzip a directory into `dest`, rooted at the directory's name.
///
/// Headers are written in deterministic mode and symlinks are archived as
/// links.
pub fn tar_gz_directory(dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let fs_err = |context: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Fs {
            context,
            path,
            source,
        }
    };

    let base = dir
        .file_name()
        .ok_or_else(|| ArchiveError::NonUtf8Path(dir.to_path_buf()))?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(fs_err("creating directory", parent))?;
    }
    let file = File::create(dest).map_err(fs_err("creating tarball", dest))?;

    let enc = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(enc);
    tar.mode(HeaderMode::Deterministic);
    tar.follow_symlinks(false);
    tar.append_dir_all(base, dir)
        .map_err(fs_err("archiving", dir))?;

    let enc = tar.into_inner().map_err(fs_err("finishing", dest))?;
    let mut finished = enc.finish().map_err(fs_err("compressing", dest))?;
    finished.flush().map_err(fs_err("flushing", dest))?;
    Ok(())
}
