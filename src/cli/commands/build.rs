//! The build command: resolve the run, pick the collaborators, run the
//! pipeline.

use crate::cli::{Args, OutputManager};
use crate::config::{EnvConfig, TimeoutConfig};
use crate::context::{BuildContext, HostOs, RunRequest};
use crate::error::{ConfigError, Result};
use crate::pipeline::ReleasePipeline;
use crate::store::{FsStore, GsutilStore};
use crate::toolchain::ToolchainRunner;

/// Execute one release build.
///
/// Configuration errors are returned before anything is allocated. Once
/// the pipeline starts, its own exit code is returned.
pub async fn execute_build(args: Args, output: &OutputManager) -> Result<i32> {
    args.validate()?;
    let os = HostOs::current().ok_or_else(|| ConfigError::InvalidArguments {
        reason: format!("unsupported host operating system: {}", std::env::consts::OS),
    })?;

    let ctx = BuildContext::resolve(
        RunRequest::from(&args),
        &EnvConfig::from_env(),
        TimeoutConfig::from_env(),
        os,
    )?;
    let runner = ToolchainRunner::new(&ctx)?;

    let status = match &args.store_root {
        Some(root) => {
            output.info(&format!("publishing into local store {}", root.display()));
            let store = FsStore::new(root);
            ReleasePipeline::new(&ctx, &runner, &store, output).run().await
        }
        None => {
            let store = GsutilStore::discover(&ctx.layout, ctx.timeouts.store)?;
            ReleasePipeline::new(&ctx, &runner, &store, output).run().await
        }
    };
    Ok(status)
}
