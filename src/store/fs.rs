//! Filesystem-backed store for dry runs and tests.
//!
//! A URL `scheme://bucket/a/b` maps to `<root>/bucket/a/b`.

use super::{AccessPolicy, Location, ObjectStore};
use crate::error::{ErrorExt, ReleaseError, Result, StoreError};
use crate::utils::fs as fs_utils;
use std::path::{Path, PathBuf};

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path backing a store URL.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let (_, rest) = split_scheme(url);
        self.root.join(rest.trim_matches('/'))
    }

    fn resolve(&self, location: &Location) -> PathBuf {
        match location {
            Location::Local(path) => path.clone(),
            Location::Remote(url) => self.path_for(url),
        }
    }

    fn url_for(&self, scheme: Option<&str>, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(match scheme {
            Some(scheme) => format!("{scheme}://{rel}"),
            None => rel,
        })
    }

    fn matches(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let (_, rest) = split_scheme(pattern);
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let mut full = format!("{}/{}", root.trim_end_matches('/'), rest.trim_start_matches('/'));
        // a trailing `**` lists every object below the prefix
        if full.ends_with("/**") {
            full.push_str("/*");
        }
        let mut paths = Vec::new();
        for entry in glob::glob(&full).map_err(StoreError::from)? {
            let path = entry.map_err(|e| ReleaseError::Fs {
                context: "listing",
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            paths.push(path);
        }
        paths.sort();
        Ok(paths)
    }
}

fn split_scheme(url: &str) -> (Option<&str>, &str) {
    match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    }
}

impl ObjectStore for FsStore {
    async fn copy(&self, from: &Location, to: &Location, recursive: bool) -> Result<()> {
        let src = self.resolve(from);
        let mut dst = self.resolve(to);
        let meta = match tokio::fs::metadata(&src).await {
            Ok(meta) => meta,
            Err(_) => {
                return Err(StoreError::NotFound {
                    location: from.to_string(),
                }
                .into());
            }
        };

        if recursive {
            let name = src.file_name().ok_or_else(|| StoreError::InvalidCopy {
                location: from.to_string(),
                reason: "source has no file name".to_string(),
            })?;
            dst = dst.join(name);
        }

        if meta.is_dir() {
            if !recursive {
                return Err(StoreError::InvalidCopy {
                    location: from.to_string(),
                    reason: "directory copy requires recursion".to_string(),
                }
                .into());
            }
            copy_tree_overwriting(&src, &dst).await
        } else {
            fs_utils::copy_file(&src, &dst).await
        }
    }

    async fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let (scheme, _) = split_scheme(pattern);
        Ok(self
            .matches(pattern)?
            .into_iter()
            .filter(|path| path.is_file())
            .filter_map(|path| self.url_for(scheme, &path))
            .collect())
    }

    async fn remove(&self, pattern: &str, recursive: bool) -> Result<()> {
        for path in self.matches(pattern)? {
            if path.is_dir() {
                if recursive {
                    fs_utils::remove_dir_all(&path).await?;
                } else {
                    log::warn!("not removing directory {} without recursion", path.display());
                }
            } else {
                tokio::fs::remove_file(&path)
                    .await
                    .fs_context("removing", &path)?;
            }
        }
        Ok(())
    }

    async fn set_access_policy(&self, object: &str, policy: &AccessPolicy) -> Result<()> {
        if !self.path_for(object).is_file() {
            return Err(StoreError::NotFound {
                location: object.to_string(),
            }
            .into());
        }
        log::debug!("access policy {} applied to {}", policy, object);
        Ok(())
    }
}

/// Copy a directory tree over an existing one, replacing files.
async fn copy_tree_overwriting(src: &Path, dst: &Path) -> Result<()> {
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to)
            .await
            .fs_context("creating directory", &to)?;
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .fs_context("reading directory", &from)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .fs_context("reading directory", &from)?
        {
            let path = entry.path();
            let target = to.join(entry.file_name());
            if path.is_dir() {
                stack.push((path, target));
            } else {
                fs_utils::copy_file(&path, &target).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn urls_map_under_root() {
        let store = FsStore::new("/srv/store");
        assert_eq!(
            store.path_for("gs://bucket/456/a.zip"),
            PathBuf::from("/srv/store/bucket/456/a.zip")
        );
    }

    #[tokio::test]
    async fn copy_then_list_round_trips_urls() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("store"));
        let file = tmp.path().join("VERSION");
        std::fs::write(&file, b"1").unwrap();

        store
            .copy(&Location::local(&file), &Location::remote("gs://b/456/VERSION"), false)
            .await
            .unwrap();
        store
            .copy(
                &Location::remote("gs://b/456/VERSION"),
                &Location::remote("gs://b/latest/VERSION"),
                false,
            )
            .await
            .unwrap();

        assert_eq!(
            store.list("gs://b/*/VERSION").await.unwrap(),
            vec!["gs://b/456/VERSION", "gs://b/latest/VERSION"]
        );
        assert!(store.list("gs://b/none-*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recursive_copy_nests_source_name() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("store"));
        let site = tmp.path().join("plugins");
        std::fs::create_dir_all(site.join("sub")).unwrap();
        std::fs::write(site.join("sub/a.jar"), b"jar").unwrap();

        store
            .copy(&Location::local(&site), &Location::remote("gs://b/456/eclipse-update"), true)
            .await
            .unwrap();

        assert!(store.path_for("gs://b/456/eclipse-update/plugins/sub/a.jar").is_file());
        assert_eq!(
            store.list("gs://b/456/eclipse-update/**/*").await.unwrap(),
            vec!["gs://b/456/eclipse-update/plugins/sub/a.jar"]
        );
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let err = store
            .copy(&Location::remote("gs://b/nope"), &Location::local(tmp.path().join("x")), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn remove_and_policy() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("b/site/x")).unwrap();
        std::fs::write(tmp.path().join("b/site/index.html"), b"<html/>").unwrap();

        store
            .set_access_policy("gs://b/site/index.html", &AccessPolicy::Canned("public-read".into()))
            .await
            .unwrap();
        store.remove("gs://b/site/*", true).await.unwrap();
        assert!(!tmp.path().join("b/site/index.html").exists());
        assert!(!tmp.path().join("b/site/x").exists());
        assert!(
            store
                .set_access_policy("gs://b/site/index.html", &AccessPolicy::Canned("x".into()))
                .await
                .is_err()
        );
    }
}
