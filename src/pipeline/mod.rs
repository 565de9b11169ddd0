//! Release pipeline orchestration.
//!
//! [`ReleasePipeline`] sequences SDK assembly, packaging, artifact merging,
//! tests and publication for one revision. Stages run strictly one after
//! another. Every temporary path the run allocates is owned by
//! [`RunScratch`] and removed on every exit path, build root last.

mod scratch;

pub use scratch::{RunScratch, ScratchPath};

use crate::cli::OutputManager;
use crate::context::{BuildContext, HostOs};
use crate::error::{ErrorExt, IntegrityError, Result, StageError, exit_code};
use crate::merge::{self, ArtifactMerger, rules};
use crate::publish::{PublishManifest, PublishTarget, Publisher};
use crate::sdk::{SdkAssembler, publish_api_docs};
use crate::store::ObjectStore;
use crate::toolchain::{BuildRunner, Stage, StageInvocation, StageResult};
use crate::utils::fs as fs_utils;
use std::path::{Path, PathBuf};

/// Subdirectory of the output directory holding the update site.
const UPDATE_SITE_DIR: &str = "buildRepo";
/// Store subdirectory the update site is published under.
const UPDATE_SITE_PREFIX: &str = "eclipse-update";
/// Version file written by the packaging stage.
const VERSION_FILE: &str = "VERSION";
/// Test result pages written by the test stage.
const TEST_HTML_DIR: &str = "html";

/// Drives one release build from a resolved [`BuildContext`].
pub struct ReleasePipeline<'a, R: BuildRunner, S: ObjectStore> {
    ctx: &'a BuildContext,
    runner: &'a R,
    store: &'a S,
    output: &'a OutputManager,
    temp_dir: PathBuf,
}

impl<'a, R: BuildRunner, S: ObjectStore> ReleasePipeline<'a, R, S> {
    /// Pipeline allocating its scratch files in the system temp directory.
    pub fn new(ctx: &'a BuildContext, runner: &'a R, store: &'a S, output: &'a OutputManager) -> Self {
        Self {
            ctx,
            runner,
            store,
            output,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Allocate the property file and extras directory under `dir` instead.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Run the pipeline and return the process exit code.
    ///
    /// Errors are reported as an error block followed by recovery hints.
    pub async fn run(&self) -> i32 {
        match self.execute().await {
            Ok(status) => {
                if status == exit_code::SUCCESS {
                    self.output.success(&format!("revision {} done", self.ctx.revision));
                } else {
                    self.output
                        .warn(&format!("revision {} finished with status {}", self.ctx.revision, status));
                }
                status
            }
            Err(e) => {
                log::error!("pipeline failed: {}", e);
                self.output.error_block(&e.to_string());
                for suggestion in e.recovery_suggestions() {
                    self.output.indent(&format!("→ {}", suggestion));
                }
                e.exit_code()
            }
        }
    }

    /// Run the pipeline. `Ok` carries a stage status, zero on success.
    pub async fn execute(&self) -> Result<i32> {
        let scratch = RunScratch::allocate(self.ctx, &self.temp_dir)?;
        self.prepare_output_dir().await?;
        self.print_banner();

        let target = PublishTarget::new(
            &self.ctx.bucket,
            &self.ctx.revision,
            self.ctx.access_policy.clone(),
        );
        let mut publisher = Publisher::new(self.store, target);

        let status = if self.ctx.installs_artifacts() {
            self.build_release(&scratch, &mut publisher).await?
        } else {
            self.build_update_site(&scratch, &mut publisher).await?
        };

        drop(scratch);
        Ok(status)
    }

    fn print_banner(&self) {
        let ctx = self.ctx;
        self.output.section("build configuration");
        self.output.indent(&format!("revision     = {}", ctx.revision));
        self.output.indent(&format!("builder      = {}", ctx.builder));
        self.output.indent(&format!("os           = {}", ctx.os));
        self.output.indent(&format!("source root  = {}", ctx.layout.root().display()));
        self.output.indent(&format!("build root   = {}", ctx.build_root.display()));
        self.output.indent(&format!("output       = {}", ctx.out_dir.display()));
        self.output.indent(&format!("destination  = {}", ctx.bucket));
        self.output.verbose(&format!("automation   = {}", ctx.automation));
        self.output.verbose(&format!("skip tests   = {}", ctx.skip_tests));
    }

    /// Create the output directory and remove artifacts of earlier runs.
    async fn prepare_output_dir(&self) -> Result<()> {
        let out = &self.ctx.out_dir;
        fs_utils::create_dir_all(out, false).await?;
        let mut entries = tokio::fs::read_dir(out)
            .await
            .fs_context("reading output directory", out)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .fs_context("reading output directory", out)?
        {
            if rules::is_stale_artifact(&entry.file_name().to_string_lossy()) {
                log::info!("removing stale artifact {}", entry.path().display());
                fs_utils::remove_path_best_effort(&entry.path());
            }
        }
        Ok(())
    }

    async fn run_stage(&self, invocation: StageInvocation) -> Result<StageResult> {
        log::debug!("running {} stage with {:?}", invocation.stage, invocation.params);
        self.runner.run_stage(&invocation).await
    }

    /// Editor-only role: build the update site and publish it.
    async fn build_update_site(
        &self,
        scratch: &RunScratch,
        publisher: &mut Publisher<'_, S>,
    ) -> Result<i32> {
        self.output.section("building the update site");
        let invocation = StageInvocation::new(Stage::UpdateSite, self.ctx, scratch.property_file.path())
            .arg(format!("-Dbuild.dir={}", self.ctx.out_dir.display()));
        let result = self.run_stage(invocation).await?;
        if !result.is_success() {
            self.output.error_block(&format!("update site build failed with status {}", result.status));
            self.surface_runtime_log(&result).await;
            return Ok(result.status);
        }

        let site = self.ctx.out_dir.join(UPDATE_SITE_DIR);
        if !site.is_dir() {
            return Err(IntegrityError::MissingUpdateSite { path: site }.into());
        }
        self.output.section("publishing the update site");
        publisher.publish_site(&site, UPDATE_SITE_PREFIX).await?;
        self.write_manifest(publisher).await?;
        Ok(0)
    }

    /// Full role, or a forced editor-only run: SDK, packaging, merge,
    /// tests, publication.
    async fn build_release(
        &self,
        scratch: &RunScratch,
        publisher: &mut Publisher<'_, S>,
    ) -> Result<i32> {
        let ctx = self.ctx;

        self.output.section("running the build of the Dart SDK");
        let sdk = SdkAssembler::new(ctx, self.runner).assemble().await?;
        for archive in &sdk.archives {
            publisher.publish(archive).await?;
        }

        if ctx.os == HostOs::Linux
            && let Some(dest) = ctx.api_docs_dest.as_deref()
        {
            self.output.section("building the API documentation");
            publish_api_docs(ctx, self.runner, publisher, dest).await?;
        }

        self.output.section("running the build to produce the zipped RCPs");
        let invocation = StageInvocation::new(Stage::Package, ctx, scratch.property_file.path())
            .sdk_zip(&sdk.primary)
            .extra_artifacts(scratch.extra_artifacts.path());
        let package = self.run_stage(invocation).await?;
        if !package.is_success() {
            self.output
                .error_block(&format!("packaging failed with status {}", package.status));
            self.surface_runtime_log(&package).await;
            return Ok(package.status);
        }
        if package.properties.is_empty() {
            return Err(StageError::NoProperties {
                path: scratch.property_file.path().to_path_buf(),
            }
            .into());
        }

        if ctx.headless {
            self.output.info("headless build; skipping SDK and runtime installation");
            return Ok(0);
        }

        let archives = merge::find_package_archives(&ctx.out_dir).await?;
        if archives.is_empty() {
            return Err(IntegrityError::NoPackageArchives {
                dir: ctx.out_dir.clone(),
            }
            .into());
        }

        let merger = ArtifactMerger::new(ctx, self.store);
        self.output.section("installing the SDK");
        merger.install_sdk(&archives, &ctx.out_dir).await?;
        self.output.section("installing the runtime");
        let installed = merger.install_runtime(&archives).await?;
        for name in installed {
            self.output.indent(&name);
        }

        let mut final_status = 0;
        if ctx.skip_tests {
            self.output.info("tests skipped");
        } else {
            self.output.section("running the tests");
            let invocation = StageInvocation::new(Stage::Test, ctx, scratch.property_file.path())
                .extra_artifacts(scratch.extra_artifacts.path());
            let tests = self.run_stage(invocation).await?;
            self.publish_test_html(publisher).await;
            if !tests.is_success() {
                self.output
                    .error_block(&format!("tests failed with status {}", tests.status));
                self.surface_runtime_log(&tests).await;
                final_status = tests.status;
            }
        }

        self.output.section("publishing the package archives");
        let archives = merge::rename_package_archives(&ctx.out_dir).await?;
        merger
            .install_extras(&archives, scratch.extra_artifacts.path())
            .await?;

        let version_file = ctx.out_dir.join(VERSION_FILE);
        if version_file.is_file() {
            publisher.publish(&version_file).await?;
        }
        for archive in &archives {
            let receipt = publisher.publish(archive.path()).await?;
            self.output.indent(&format!("{} ({} bytes)", receipt.latest, receipt.size));
        }

        self.write_manifest(publisher).await?;
        Ok(final_status)
    }

    /// Upload test result pages. Failures are reported, never fatal.
    async fn publish_test_html(&self, publisher: &mut Publisher<'_, S>) {
        let html = self.ctx.out_dir.join(TEST_HTML_DIR);
        if !html.is_dir() {
            return;
        }
        let scratch = self.ctx.scratch_dir();
        let result = match fs_utils::create_dir_all(&scratch, false).await {
            Ok(()) => {
                publisher
                    .publish_test_results(&html, &self.ctx.revision, self.ctx.os.as_str(), &scratch)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(count) => log::info!("published {} test result objects", count),
            Err(e) => self
                .output
                .warn(&format!("could not publish test results: {}", e)),
        }
    }

    async fn write_manifest(&self, publisher: &Publisher<'_, S>) -> Result<()> {
        let target = publisher.target();
        let manifest = PublishManifest::new(
            self.ctx,
            &target.pinned,
            &target.latest,
            publisher.receipts(),
            publisher.trees(),
        );
        let path = manifest.write(&self.ctx.out_dir).await?;
        self.output.verbose(&format!("wrote {}", path.display()));
        Ok(())
    }

    /// Print the runtime's configuration logs, if the stage reported a
    /// runtime directory.
    async fn surface_runtime_log(&self, result: &StageResult) {
        let Some(runtime_dir) = result.runtime_dir() else {
            return;
        };
        self.output
            .info(&format!("searching {} for error logs", runtime_dir.display()));
        for log_file in runtime_logs(runtime_dir) {
            self.output.info(&format!("found log file {}", log_file.display()));
            match tokio::fs::read_to_string(&log_file).await {
                Ok(text) => text.lines().for_each(|line| self.output.println(line)),
                Err(e) => log::warn!("cannot read {}: {}", log_file.display(), e),
            }
        }
    }
}

/// `*.log` files under `<runtime>/eclipse/configuration`, sorted.
fn runtime_logs(runtime_dir: &Path) -> Vec<PathBuf> {
    let config_dir = runtime_dir.join("eclipse").join("configuration");
    let pattern = format!(
        "{}/*.log",
        glob::Pattern::escape(&config_dir.to_string_lossy())
    );
    let mut logs: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
        Err(e) => {
            log::warn!("bad log pattern {}: {}", pattern, e);
            Vec::new()
        }
    };
    logs.sort();
    logs
}
