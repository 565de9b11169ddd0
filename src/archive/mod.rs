//! Zip archive service.
//!
//! Package archives are only ever appended to: injecting a tree adds new
//! entries and leaves existing ones untouched. An entry whose name is
//! already present is skipped, so repeating an injection is a no-op and
//! the archive is not rewritten at all.

mod tarball;

pub use tarball::tar_gz_directory;

use crate::error::ArchiveError;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

type Result<T> = std::result::Result<T, ArchiveError>;

fn fs_err<'a>(context: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> ArchiveError + 'a {
    move |source| ArchiveError::Fs {
        context,
        path: path.to_path_buf(),
        source,
    }
}

fn zip_err(path: &Path) -> impl FnOnce(zip::result::ZipError) -> ArchiveError + '_ {
    move |source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    }
}

/// Run archive work on the blocking thread pool.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ArchiveError::Join(e.to_string()))?
}

/// A zip archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArchive {
    path: PathBuf,
}

impl PackageArchive {
    /// Refer to an existing archive.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Archive location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the archive.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Names of all entries, sorted.
    pub fn entries(&self) -> Result<Vec<String>> {
        Ok(self.entry_set()?.into_iter().collect())
    }

    fn entry_set(&self) -> Result<BTreeSet<String>> {
        let file = File::open(&self.path).map_err(fs_err("opening archive", &self.path))?;
        let archive = ZipArchive::new(file).map_err(zip_err(&self.path))?;
        Ok(archive.file_names().map(str::to_string).collect())
    }

    /// Add every file under `source` to the archive below `prefix`.
    ///
    /// Missing directory entries for `prefix` itself are added too. Returns
    /// the number of entries written.
    pub fn inject_tree(&self, source: &Path, prefix: &str) -> Result<usize> {
        let mut existing = self.entry_set()?;
        let prefix = prefix.trim_matches('/');
        let mut pending = Vec::new();

        let mut parent = String::new();
        for part in prefix.split('/').filter(|p| !p.is_empty()) {
            parent.push_str(part);
            parent.push('/');
            if existing.insert(parent.clone()) {
                pending.push(Pending::Directory {
                    name: parent.clone(),
                    mode: None,
                });
            }
        }

        for entry in WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            let rel = entry.path().strip_prefix(source)?;
            let rel = entry_name(rel)?;
            let name = if prefix.is_empty() {
                rel
            } else {
                format!("{prefix}/{rel}")
            };
            let file_type = entry.file_type();
            let meta = entry
                .path()
                .symlink_metadata()
                .map_err(fs_err("reading", entry.path()))?;
            let mode = unix_mode(&meta);

            if file_type.is_dir() {
                let name = format!("{name}/");
                if existing.insert(name.clone()) {
                    pending.push(Pending::Directory { name, mode });
                }
            } else if existing.insert(name.clone()) {
                if file_type.is_symlink() {
                    let target = fs::read_link(entry.path())
                        .map_err(fs_err("reading link", entry.path()))?;
                    pending.push(Pending::Symlink {
                        name,
                        target: entry_name(&target)?,
                        mode,
                    });
                } else {
                    pending.push(Pending::File {
                        name,
                        source: entry.path().to_path_buf(),
                        mode,
                    });
                }
            }
        }

        if pending.is_empty() {
            log::debug!(
                "{}: nothing new to inject from {}",
                self.path.display(),
                source.display()
            );
            return Ok(0);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(fs_err("opening archive", &self.path))?;
        let mut writer = ZipWriter::new_append(file).map_err(zip_err(&self.path))?;
        let written = pending.len();
        for item in pending {
            item.write(&mut writer, &self.path)?;
        }
        writer.finish().map_err(zip_err(&self.path))?;
        log::debug!(
            "{}: injected {} entries from {} under '{}'",
            self.path.display(),
            written,
            source.display(),
            prefix
        );
        Ok(written)
    }

    /// Unpack every entry into `dest`.
    ///
    /// Entry names that would escape `dest` are rejected.
    pub fn extract_to(&self, dest: &Path) -> Result<()> {
        let file = File::open(&self.path).map_err(fs_err("opening archive", &self.path))?;
        let mut archive = ZipArchive::new(file).map_err(zip_err(&self.path))?;
        fs::create_dir_all(dest).map_err(fs_err("creating directory", dest))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(zip_err(&self.path))?;
            let rel = entry.enclosed_name().ok_or_else(|| ArchiveError::Fs {
                context: "unsafe entry name in",
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, entry.name().to_string()),
            })?;
            let dest_path = dest.join(rel);

            if entry.is_dir() {
                fs::create_dir_all(&dest_path).map_err(fs_err("creating directory", &dest_path))?;
                continue;
            }
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(fs_err("creating directory", parent))?;
            }

            #[cfg(unix)]
            if entry.is_symlink() {
                let mut target = String::new();
                io::Read::read_to_string(&mut entry, &mut target)
                    .map_err(fs_err("reading link entry for", &dest_path))?;
                std::os::unix::fs::symlink(&target, &dest_path)
                    .map_err(fs_err("creating link", &dest_path))?;
                continue;
            }

            let mut outfile =
                File::create(&dest_path).map_err(fs_err("creating file", &dest_path))?;
            io::copy(&mut entry, &mut outfile).map_err(fs_err("writing", &dest_path))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode & 0o7777))
                        .map_err(fs_err("setting permissions on", &dest_path))?;
                }
            }
        }

        Ok(())
    }
}

enum Pending {
    Directory {
        name: String,
        mode: Option<u32>,
    },
    File {
        name: String,
        source: PathBuf,
        mode: Option<u32>,
    },
    Symlink {
        name: String,
        target: String,
        mode: Option<u32>,
    },
}

impl Pending {
    fn write(self, writer: &mut ZipWriter<File>, archive: &Path) -> Result<()> {
        match self {
            Pending::Directory { name, mode } => writer
                .add_directory(name, options(mode))
                .map_err(zip_err(archive)),
            Pending::Symlink { name, target, mode } => writer
                .add_symlink(name, target, options(mode))
                .map_err(zip_err(archive)),
            Pending::File { name, source, mode } => {
                writer
                    .start_file(name, options(mode))
                    .map_err(zip_err(archive))?;
                let mut input = File::open(&source).map_err(fs_err("opening", &source))?;
                io::copy(&mut input, writer).map_err(fs_err("compressing", &source))?;
                Ok(())
            }
        }
    }
}

fn options(mode: Option<u32>) -> SimpleFileOptions {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    match mode {
        Some(mode) => options.unix_permissions(mode & 0o7777),
        None => options,
    }
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode())
}

#[cfg(not(unix))]
fn unix_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// Convert a relative path to a `/`-separated entry name.
fn entry_name(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| ArchiveError::NonUtf8Path(path.to_path_buf()))?,
            ),
            Component::ParentDir => parts.push(".."),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::NonUtf8Path(path.to_path_buf()));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Zip a directory into `dest`, with the directory's own name as the
/// single top-level entry. Symlinks are stored as links.
pub fn zip_directory(dir: &Path, dest: &Path) -> Result<()> {
    let base = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::NonUtf8Path(dir.to_path_buf()))?
        .to_string();
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(fs_err("creating directory", parent))?;
    }
    let file = File::create(dest).map_err(fs_err("creating archive", dest))?;
    let mut writer = ZipWriter::new(file);
    writer
        .add_directory(format!("{base}/"), options(None))
        .map_err(zip_err(dest))?;
    writer.finish().map_err(zip_err(dest))?;

    PackageArchive::open(dest).inject_tree(dir, &base)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("dart/DartEditor.ini", SimpleFileOptions::default())
            .unwrap();
        io::Write::write_all(&mut writer, b"-vmargs").unwrap();
        writer.finish().unwrap();
    }

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("dart-sdk/bin")).unwrap();
        fs::write(root.join("dart-sdk/bin/dart"), b"vm").unwrap();
        fs::write(root.join("dart-sdk/version"), b"1.0").unwrap();
    }

    #[test]
    fn inject_adds_entries_under_prefix() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("dart-editor-linux.gtk.x86.zip");
        empty_zip(&zip_path);
        let tree = tmp.path().join("tree");
        sample_tree(&tree);

        let archive = PackageArchive::open(&zip_path);
        let written = archive.inject_tree(&tree, "dart").unwrap();
        assert_eq!(written, 5);

        let entries = archive.entries().unwrap();
        assert!(entries.contains(&"dart/DartEditor.ini".to_string()));
        assert!(entries.contains(&"dart/dart-sdk/".to_string()));
        assert!(entries.contains(&"dart/dart-sdk/bin/dart".to_string()));
        assert!(entries.contains(&"dart/dart-sdk/version".to_string()));
    }

    #[test]
    fn repeated_injection_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("a.zip");
        empty_zip(&zip_path);
        let tree = tmp.path().join("tree");
        sample_tree(&tree);

        let archive = PackageArchive::open(&zip_path);
        archive.inject_tree(&tree, "dart/chromium").unwrap();
        let first = fs::read(&zip_path).unwrap();
        let entries = archive.entries().unwrap();

        assert_eq!(archive.inject_tree(&tree, "dart/chromium").unwrap(), 0);
        assert_eq!(fs::read(&zip_path).unwrap(), first);
        assert_eq!(archive.entries().unwrap(), entries);
        assert!(entries.contains(&"dart/chromium/".to_string()));
    }

    #[test]
    fn existing_entries_are_left_untouched() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("a.zip");
        empty_zip(&zip_path);
        let tree = tmp.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("DartEditor.ini"), b"replaced").unwrap();

        let archive = PackageArchive::open(&zip_path);
        archive.inject_tree(&tree, "dart").unwrap();

        let out = tmp.path().join("out");
        archive.extract_to(&out).unwrap();
        assert_eq!(fs::read(out.join("dart/DartEditor.ini")).unwrap(), b"-vmargs");
    }

    #[test]
    fn zip_directory_roots_entries_at_basename() {
        let tmp = TempDir::new().unwrap();
        sample_tree(tmp.path());
        let dest = tmp.path().join("dist/dartsdk-linux-32.zip");

        zip_directory(&tmp.path().join("dart-sdk"), &dest).unwrap();

        let entries = PackageArchive::open(&dest).entries().unwrap();
        assert_eq!(
            entries,
            vec!["dart-sdk/", "dart-sdk/bin/", "dart-sdk/bin/dart", "dart-sdk/version"]
        );
    }

    #[test]
    fn extract_restores_tree() {
        let tmp = TempDir::new().unwrap();
        sample_tree(tmp.path());
        let dest = tmp.path().join("sdk.zip");
        zip_directory(&tmp.path().join("dart-sdk"), &dest).unwrap();

        let out = tmp.path().join("unzipped");
        PackageArchive::open(&dest).extract_to(&out).unwrap();
        assert_eq!(fs::read(out.join("dart-sdk/bin/dart")).unwrap(), b"vm");
    }

    #[cfg(unix)]
    #[test]
    fn permissions_survive_a_round_trip() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        sample_tree(tmp.path());
        let bin = tmp.path().join("dart-sdk/bin/dart");
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        let dest = tmp.path().join("sdk.zip");
        zip_directory(&tmp.path().join("dart-sdk"), &dest).unwrap();

        let out = tmp.path().join("unzipped");
        PackageArchive::open(&dest).extract_to(&out).unwrap();
        let mode = fs::metadata(out.join("dart-sdk/bin/dart")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
