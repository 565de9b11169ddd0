//! SDK assembly.
//!
//! Builds the SDK for both architectures of the host and archives each tree
//! as `dartsdk-<os>-<bits>.zip` (plus `.tar.gz` off Windows).
//!
//! On Linux the 64-bit SDK is not built directly. The 32-bit SDK is built
//! normally, the 64-bit VM is built on its own, and the 64-bit SDK is
//! synthesized by copying the 32-bit tree and replacing `bin/dart`. This
//! assumes everything in the SDK except the VM binary is
//! architecture-independent.

mod docs;

pub use docs::{API_DOCS_ARCHIVE, publish_api_docs};

use crate::archive::{self, tar_gz_directory, zip_directory};
use crate::context::{Arch, BuildContext, HostOs};
use crate::error::{IntegrityError, Result, StageError};
use crate::toolchain::BuildRunner;
use crate::utils::fs as fs_utils;
use std::path::{Path, PathBuf};

/// Build script target producing a full SDK tree.
pub const CREATE_SDK_TARGET: &str = "create_sdk";
/// Build script target producing only the VM.
pub const RUNTIME_TARGET: &str = "runtime";

/// File name of an SDK archive.
pub fn sdk_archive_name(os: HostOs, arch: Arch, extension: &str) -> String {
    format!("dartsdk-{}-{}.{}", os.as_str(), arch.bits(), extension)
}

/// Archives produced by [`SdkAssembler::assemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkBundle {
    /// Every archive, in publication order
    pub archives: Vec<PathBuf>,
    /// The 32-bit zip handed to the packaging stage
    pub primary: PathBuf,
}

/// Builds and archives the host's SDKs.
pub struct SdkAssembler<'a, R: BuildRunner> {
    ctx: &'a BuildContext,
    runner: &'a R,
}

impl<'a, R: BuildRunner> SdkAssembler<'a, R> {
    /// Assembler for a run.
    pub fn new(ctx: &'a BuildContext, runner: &'a R) -> Self {
        Self { ctx, runner }
    }

    /// Run one build script target; any non-zero status is fatal.
    pub async fn build_target(&self, archs: &[Arch], target: &str) -> Result<()> {
        let status = self.runner.build_sdk_target(archs, target).await?;
        if status != 0 {
            return Err(StageError::SdkBuildFailed {
                target: format!("{} ({})", target, Arch::join(archs)),
                status,
            }
            .into());
        }
        Ok(())
    }

    fn tree(&self, arch: Arch) -> PathBuf {
        self.ctx.layout.sdk_tree(self.ctx.os, self.ctx.mode, arch)
    }

    /// Build, synthesize where needed, and archive the SDKs.
    pub async fn assemble(&self) -> Result<SdkBundle> {
        match self.ctx.os {
            HostOs::Linux => {
                self.build_target(&[Arch::Ia32], CREATE_SDK_TARGET).await?;
                self.build_target(&[Arch::X64], RUNTIME_TARGET).await?;
                self.synthesize_x64().await?;
            }
            HostOs::MacOs | HostOs::Win32 => {
                self.build_target(&self.ctx.archs, CREATE_SDK_TARGET).await?;
            }
        }

        let mut archives = Vec::new();
        for &arch in &self.ctx.archs {
            let tree = self.tree(arch);
            if !tree.is_dir() {
                return Err(IntegrityError::MissingSdkTree { path: tree }.into());
            }

            let zip = self
                .ctx
                .out_dir
                .join(sdk_archive_name(self.ctx.os, arch, "zip"));
            archive_tree(&tree, &zip, zip_directory).await?;
            archives.push(zip);

            if self.ctx.os.ships_tarballs() {
                let tgz = self
                    .ctx
                    .out_dir
                    .join(sdk_archive_name(self.ctx.os, arch, "tar.gz"));
                archive_tree(&tree, &tgz, tar_gz_directory).await?;
                archives.push(tgz);
            }
        }

        Ok(SdkBundle {
            primary: self
                .ctx
                .out_dir
                .join(sdk_archive_name(self.ctx.os, Arch::Ia32, "zip")),
            archives,
        })
    }

    /// Replace the 64-bit tree with a copy of the 32-bit tree carrying the
    /// 64-bit VM.
    async fn synthesize_x64(&self) -> Result<()> {
        let sdk32 = self.tree(Arch::Ia32);
        let sdk64 = self.tree(Arch::X64);
        let vm64 = self
            .ctx
            .layout
            .sdk_build_dir(self.ctx.os, self.ctx.mode, Arch::X64)
            .join("dart");
        if !sdk32.is_dir() {
            return Err(IntegrityError::MissingSdkTree { path: sdk32 }.into());
        }
        if !vm64.is_file() {
            return Err(IntegrityError::MissingSdkTree { path: vm64 }.into());
        }

        log::info!(
            "synthesizing {} from {} and {}",
            sdk64.display(),
            sdk32.display(),
            vm64.display()
        );
        fs_utils::remove_dir_all(&sdk64).await?;
        fs_utils::copy_dir(&sdk32, &sdk64).await?;
        fs_utils::copy_file(&vm64, &sdk64.join("bin").join("dart")).await
    }
}

async fn archive_tree(
    tree: &Path,
    dest: &Path,
    write: fn(&Path, &Path) -> std::result::Result<(), crate::error::ArchiveError>,
) -> Result<()> {
    log::info!("archiving {} -> {}", tree.display(), dest.display());
    let (tree, dest) = (tree.to_path_buf(), dest.to_path_buf());
    archive::blocking(move || write(&tree, &dest)).await?;
    Ok(())
}
