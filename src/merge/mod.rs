//! Merging independently built trees into the package archives.
//!
//! Three phases, each injecting a tree under a fixed prefix of every
//! package archive: the SDK matching the archive's width, the browser
//! runtime matching its platform, and the extra artifacts the packaging
//! stage deposited.

pub mod rules;

use crate::archive::{self, PackageArchive};
use crate::context::{BuildContext, UnmatchedRuntimePolicy};
use crate::error::{ErrorExt, IntegrityError, Result};
use crate::sdk::sdk_archive_name;
use crate::store::{self, Location, ObjectStore};
use crate::utils::fs as fs_utils;
use rules::{ARCHIVE_ROOT, RuntimePlacement};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Package archives in `dir`, sorted by name.
pub async fn find_package_archives(dir: &Path) -> Result<Vec<PackageArchive>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .fs_context("reading output directory", dir)?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("reading output directory", dir)?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if rules::is_package_archive(&name) && entry.path().is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found.into_iter().map(PackageArchive::open).collect())
}

/// Rename every package archive in `dir` to its published name.
///
/// All names are checked before anything is renamed, so an unknown name
/// leaves the directory untouched.
pub async fn rename_package_archives(dir: &Path) -> Result<Vec<PackageArchive>> {
    let archives = find_package_archives(dir).await?;
    let mut plan = Vec::with_capacity(archives.len());
    for archive in &archives {
        let target = rules::normalized_name(&archive.file_name())?;
        plan.push((archive.path().to_path_buf(), dir.join(target)));
    }

    let mut renamed = Vec::with_capacity(plan.len());
    for (from, to) in plan {
        log::info!("renaming {} -> {}", from.display(), to.display());
        tokio::fs::rename(&from, &to)
            .await
            .fs_context("renaming", &from)?;
        renamed.push(PackageArchive::open(to));
    }
    renamed.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(renamed)
}

async fn inject(archive: &PackageArchive, tree: &Path, prefix: &str) -> Result<usize> {
    let (archive, tree, prefix) = (archive.clone(), tree.to_path_buf(), prefix.to_string());
    Ok(archive::blocking(move || archive.inject_tree(&tree, &prefix)).await?)
}

async fn extract(archive: &PackageArchive, dest: &Path) -> Result<()> {
    let (archive, dest) = (archive.clone(), dest.to_path_buf());
    Ok(archive::blocking(move || archive.extract_to(&dest)).await?)
}

/// Injects SDK, runtime and extra trees into package archives.
pub struct ArtifactMerger<'a, S: ObjectStore> {
    ctx: &'a BuildContext,
    store: &'a S,
    scratch: PathBuf,
}

impl<'a, S: ObjectStore> ArtifactMerger<'a, S> {
    /// Merger unpacking into the run's scratch directory.
    pub fn new(ctx: &'a BuildContext, store: &'a S) -> Self {
        Self {
            ctx,
            store,
            scratch: ctx.scratch_dir(),
        }
    }

    /// Inject the SDK of matching width into every archive under `dart/`.
    ///
    /// `sdk_dir` holds the `dartsdk-<os>-<bits>.zip` archives; each width is
    /// unpacked once.
    pub async fn install_sdk(&self, archives: &[PackageArchive], sdk_dir: &Path) -> Result<()> {
        let mut unpacked = BTreeMap::new();
        for archive in archives {
            let arch = rules::sdk_arch_for(&archive.file_name());
            if !unpacked.contains_key(&arch) {
                let sdk_zip = sdk_dir.join(sdk_archive_name(self.ctx.os, arch, "zip"));
                if !sdk_zip.is_file() {
                    return Err(IntegrityError::MissingSdkArchive { path: sdk_zip }.into());
                }
                let dest = self.scratch.join(format!("unzip_sdk_{}", arch.bits()));
                fs_utils::create_dir_all(&dest, true).await?;
                extract(&PackageArchive::open(&sdk_zip), &dest).await?;
                unpacked.insert(arch, dest);
            }
            let written = inject(archive, &unpacked[&arch], ARCHIVE_ROOT).await?;
            log::info!(
                "installed {}-bit SDK into {} ({} entries)",
                arch.bits(),
                archive.file_name(),
                written
            );
        }
        Ok(())
    }

    /// Inject the matching browser runtime into every archive.
    ///
    /// Returns the names of the archives that received a runtime. The
    /// scratch directory is removed afterwards.
    pub async fn install_runtime(&self, archives: &[PackageArchive]) -> Result<Vec<String>> {
        let result = self.install_runtime_inner(archives).await;
        fs_utils::remove_path_best_effort(&self.scratch);
        result
    }

    async fn install_runtime_inner(&self, archives: &[PackageArchive]) -> Result<Vec<String>> {
        let available = self.store.list(&self.ctx.runtime_store).await?;
        if available.is_empty() {
            return Err(IntegrityError::NoRuntimeArchives {
                pattern: self.ctx.runtime_store.clone(),
            }
            .into());
        }
        for url in &available {
            log::debug!("runtime archive available: {}", url);
        }

        let placement = RuntimePlacement::for_os(self.ctx.os);
        let mut installed = Vec::new();
        for archive in archives {
            let name = archive.file_name();
            let Some(rule) = rules::runtime_rule_for(&name) else {
                match self.ctx.unmatched_runtime {
                    UnmatchedRuntimePolicy::Skip => {
                        log::warn!("no runtime rule matches {}; leaving it without a runtime", name);
                        continue;
                    }
                    UnmatchedRuntimePolicy::Fail => {
                        return Err(IntegrityError::UnmatchedRuntime { archive: name }.into());
                    }
                }
            };

            let url = available
                .iter()
                .find(|url| store::object_name(url).starts_with(rule.prefix))
                .ok_or_else(|| IntegrityError::RuntimeNotFound {
                    archive: name.clone(),
                    prefix: rule.prefix.to_string(),
                })?;

            let unpacked = self.fetch_runtime(url).await?;
            let product = locate_product(&unpacked, &placement)?;
            for file in placement.strip {
                fs_utils::remove_path_best_effort(&product.join(file));
            }
            let written = inject(archive, &product, placement.target).await?;
            log::info!(
                "installed {} into {} ({} entries)",
                store::object_name(url),
                name,
                written
            );
            installed.push(name);
        }
        Ok(installed)
    }

    /// Download and unpack a runtime archive unless an earlier archive
    /// already did.
    async fn fetch_runtime(&self, url: &str) -> Result<PathBuf> {
        let file_name = store::object_name(url);
        let local_zip = self.scratch.join(file_name);
        let unpacked = self
            .scratch
            .join(file_name.strip_suffix(".zip").unwrap_or(file_name));

        if !local_zip.is_file() {
            fs_utils::create_dir_all(&unpacked, true).await?;
            log::info!("downloading {}", url);
            self.store
                .copy(&Location::remote(url), &Location::local(&local_zip), false)
                .await?;
            extract(&PackageArchive::open(&local_zip), &unpacked).await?;
        } else {
            log::debug!("reusing {}", local_zip.display());
        }
        Ok(unpacked)
    }

    /// Inject the extra-artifacts tree into every archive under `dart/`.
    pub async fn install_extras(&self, archives: &[PackageArchive], extras: &Path) -> Result<()> {
        for archive in archives {
            let written = inject(archive, extras, ARCHIVE_ROOT).await?;
            log::info!(
                "installed extra artifacts into {} ({} entries)",
                archive.file_name(),
                written
            );
        }
        Ok(())
    }
}

fn locate_product(unpacked: &Path, placement: &RuntimePlacement) -> Result<PathBuf> {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&unpacked.to_string_lossy()),
        placement.product_glob
    );
    let layout_error = |reason: String| IntegrityError::RuntimeLayout {
        dir: unpacked.to_path_buf(),
        reason,
    };
    let mut candidates: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| layout_error(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();
    let product = candidates
        .into_iter()
        .next()
        .ok_or_else(|| layout_error(format!("nothing matches {}", placement.product_glob)))?;

    match placement.bundle {
        Some(bundle) => {
            let bundle_dir = product.join(bundle);
            if bundle_dir.is_dir() {
                Ok(bundle_dir)
            } else {
                Err(layout_error(format!("{} has no {}", product.display(), bundle)).into())
            }
        }
        None => Ok(product),
    }
}
