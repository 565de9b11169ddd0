//! Two-destination publication.
//!
//! Every object goes to the revision-pinned prefix first. Only after that
//! copy (and its access policy) succeeds is the pinned object copied to the
//! `latest` prefix, so `latest` never points at a half-written upload. The
//! latest copy is made store-side from the pinned object, never re-uploaded.

mod manifest;

pub use manifest::{MANIFEST_FILE, PublishManifest};

use crate::error::{ErrorExt, ReleaseError, Result};
use crate::store::{self, AccessPolicy, Location, ObjectStore};
use crate::utils::fs as fs_utils;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Index page uploaded ahead of a tree so the destination prefix exists.
pub const INDEX_PAGE: &str = "index.html";

/// Pinned and latest prefixes plus the policy applied after each copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Bucket URL
    pub bucket: String,
    /// `<bucket>/<revision>`
    pub pinned: String,
    /// `<bucket>/latest`
    pub latest: String,
    /// Policy pushed to every written object
    pub policy: AccessPolicy,
}

impl PublishTarget {
    /// Target for a revision in a bucket.
    pub fn new(bucket: &str, revision: &str, policy: AccessPolicy) -> Self {
        Self {
            bucket: bucket.trim_end_matches('/').to_string(),
            pinned: store::join(bucket, revision),
            latest: store::join(bucket, "latest"),
            policy,
        }
    }
}

/// Record of one published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    /// Pinned object URL
    pub pinned: String,
    /// Latest object URL
    pub latest: String,
}

/// Publishes files and trees through an [`ObjectStore`].
pub struct Publisher<'a, S: ObjectStore> {
    store: &'a S,
    target: PublishTarget,
    receipts: Vec<PublishReceipt>,
    trees: Vec<String>,
}

impl<'a, S: ObjectStore> Publisher<'a, S> {
    /// Publisher writing to `target`.
    pub fn new(store: &'a S, target: PublishTarget) -> Self {
        Self {
            store,
            target,
            receipts: Vec::new(),
            trees: Vec::new(),
        }
    }

    /// Destination prefixes.
    pub fn target(&self) -> &PublishTarget {
        &self.target
    }

    /// Receipts for everything published so far.
    pub fn receipts(&self) -> &[PublishReceipt] {
        &self.receipts
    }

    /// Tree prefixes published so far.
    pub fn trees(&self) -> &[String] {
        &self.trees
    }

    /// Publish a file to the pinned prefix, then mirror it to latest.
    pub async fn publish(&mut self, file: &Path) -> Result<PublishReceipt> {
        let name = file_name(file)?;
        let (size, sha256) = digest(file).await?;
        let pinned = store::join(&self.target.pinned, &name);
        let latest = store::join(&self.target.latest, &name);

        log::info!("publishing {} -> {}", file.display(), pinned);
        self.upload_file(file, &pinned).await?;
        log::info!("mirroring {} -> {}", pinned, latest);
        self.store
            .copy(&Location::remote(&pinned), &Location::remote(&latest), false)
            .await?;
        self.store
            .set_access_policy(&latest, &self.target.policy)
            .await?;

        let receipt = PublishReceipt {
            name,
            size,
            sha256,
            pinned,
            latest,
        };
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    /// Copy one local file to exactly `object` and apply the policy.
    pub async fn upload_file(&self, file: &Path, object: &str) -> Result<()> {
        self.store
            .copy(&Location::local(file), &Location::remote(object), false)
            .await?;
        self.store
            .set_access_policy(object, &self.target.policy)
            .await
    }

    /// Upload the contents of `dir` below `prefix`.
    ///
    /// The index page goes first, then every entry recursively, then the
    /// policy is applied to every object under the prefix. Returns the
    /// number of objects under the prefix.
    pub async fn upload_tree(&self, dir: &Path, prefix: &str) -> Result<usize> {
        let index = dir.join(INDEX_PAGE);
        if index.is_file() {
            self.store
                .copy(
                    &Location::local(&index),
                    &Location::remote(store::join(prefix, INDEX_PAGE)),
                    false,
                )
                .await?;
        }
        for entry in dir_entries(dir).await? {
            self.store
                .copy(&Location::local(&entry), &Location::remote(prefix), true)
                .await?;
        }
        self.apply_policy_under(prefix).await
    }

    /// Copy the entries of `dir` already uploaded under `from` to `to`,
    /// store-side, in the same order as [`Publisher::upload_tree`].
    pub async fn mirror_tree(&self, dir: &Path, from: &str, to: &str) -> Result<usize> {
        if dir.join(INDEX_PAGE).is_file() {
            self.store
                .copy(
                    &Location::remote(store::join(from, INDEX_PAGE)),
                    &Location::remote(store::join(to, INDEX_PAGE)),
                    false,
                )
                .await?;
        }
        for entry in dir_entries(dir).await? {
            let name = file_name(&entry)?;
            self.store
                .copy(
                    &Location::remote(store::join(from, &name)),
                    &Location::remote(to),
                    true,
                )
                .await?;
        }
        self.apply_policy_under(to).await
    }

    async fn apply_policy_under(&self, prefix: &str) -> Result<usize> {
        let objects = self.store.list(&store::join(prefix, "**")).await?;
        for object in &objects {
            self.store
                .set_access_policy(object, &self.target.policy)
                .await?;
        }
        Ok(objects.len())
    }

    /// Best-effort removal of everything under a prefix.
    async fn clear_prefix(&self, prefix: &str) {
        let pattern = store::join(prefix, "*");
        if let Err(e) = self.store.remove(&pattern, true).await {
            log::warn!("could not clear {}: {}", pattern, e);
        }
    }

    /// Publish a site directory to `<pinned>/<subdir>` and then
    /// `<latest>/<subdir>`, replacing whatever was there.
    pub async fn publish_site(&mut self, site_dir: &Path, subdir: &str) -> Result<()> {
        let pinned = store::join(&self.target.pinned, subdir);
        let latest = store::join(&self.target.latest, subdir);

        self.clear_prefix(&pinned).await;
        let count = self.upload_tree(site_dir, &pinned).await?;
        log::info!("uploaded {} objects to {}", count, pinned);
        self.trees.push(pinned.clone());

        self.clear_prefix(&latest).await;
        let count = self.mirror_tree(site_dir, &pinned, &latest).await?;
        log::info!("mirrored {} objects to {}", count, latest);
        self.trees.push(latest);
        Ok(())
    }

    /// Stage test result pages as `<revision>/tests/<os>/...` and copy them
    /// into the bucket.
    pub async fn publish_test_results(
        &mut self,
        html_dir: &Path,
        revision: &str,
        os: &str,
        scratch: &Path,
    ) -> Result<usize> {
        let staging = scratch.join(format!("tests-{}", uuid::Uuid::new_v4()));
        let local_root = staging.join(revision);
        let result = async {
            fs_utils::copy_dir(html_dir, &local_root.join("tests").join(os)).await?;
            self.store
                .copy(
                    &Location::local(&local_root),
                    &Location::remote(&self.target.bucket),
                    true,
                )
                .await?;
            let prefix = store::join(&self.target.pinned, &format!("tests/{os}"));
            let count = self.apply_policy_under(&prefix).await?;
            Ok::<_, ReleaseError>((prefix, count))
        }
        .await;
        fs_utils::remove_path_best_effort(&staging);

        let (prefix, count) = result?;
        self.trees.push(prefix);
        Ok(count)
    }
}

async fn dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let mut read = tokio::fs::read_dir(dir)
        .await
        .fs_context("reading directory", dir)?;
    while let Some(entry) = read
        .next_entry()
        .await
        .fs_context("reading directory", dir)?
    {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ReleaseError::Fs {
            context: "publishing",
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })
}

/// Size and hex SHA-256 of a file.
async fn digest(path: &Path) -> Result<(u64, String)> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<(u64, String)> {
        let mut file = std::fs::File::open(&owned)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;
        Ok((size, hex::encode(hasher.finalize())))
    })
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))?
    .fs_context("hashing", path)
}
