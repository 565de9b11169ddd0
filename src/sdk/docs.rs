use super::SdkAssembler;
use crate::archive::{self, zip_directory};
use crate::context::{Arch, BuildContext};
use crate::error::{ErrorExt, IntegrityError, Result};
use crate::publish::Publisher;
use crate::store::{self, ObjectStore};
use crate::toolchain::BuildRunner;
use std::path::PathBuf;

/// Build script target producing the API documentation.
pub const API_DOCS_TARGET: &str = "api_docs";
/// Zipped documentation tree in the output directory.
pub const API_DOCS_ARCHIVE: &str = "dart-api-docs.zip";
/// Object naming the newest documented revision.
const LATEST_MARKER: &str = "latest.txt";

/// Build the API documentation, upload the browsable tree to
/// `<dest>/<revision>`, point `<dest>/latest.txt` at it, and publish the
/// zipped tree next to the other artifacts.
///
/// `latest.txt` is only written when the tree upload succeeded.
pub async fn publish_api_docs<R, S>(
    ctx: &BuildContext,
    runner: &R,
    publisher: &mut Publisher<'_, S>,
    dest: &str,
) -> Result<PathBuf>
where
    R: BuildRunner,
    S: ObjectStore,
{
    SdkAssembler::new(ctx, runner)
        .build_target(&[Arch::Ia32], API_DOCS_TARGET)
        .await?;

    let api_dir = ctx
        .layout
        .sdk_build_dir(ctx.os, ctx.mode, Arch::Ia32)
        .join("api_docs");
    if !api_dir.is_dir() {
        return Err(IntegrityError::MissingSdkTree { path: api_dir }.into());
    }

    let pinned = store::join(dest, &ctx.revision);
    match publisher.upload_tree(&api_dir, &pinned).await {
        Ok(count) => {
            log::info!("uploaded {} documentation objects to {}", count, pinned);
            let marker = api_dir.join(LATEST_MARKER);
            tokio::fs::write(&marker, &ctx.revision)
                .await
                .fs_context("writing", &marker)?;
            publisher
                .upload_file(&marker, &store::join(dest, LATEST_MARKER))
                .await?;
        }
        Err(e) => log::warn!("documentation upload to {} failed: {}", pinned, e),
    }

    let zip = ctx.out_dir.join(API_DOCS_ARCHIVE);
    let (tree, dest_zip) = (api_dir.clone(), zip.clone());
    archive::blocking(move || zip_directory(&tree, &dest_zip)).await?;
    publisher.publish(&zip).await?;
    Ok(zip)
}
