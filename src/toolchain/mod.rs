//! External build tool invocation.
//!
//! [`BuildRunner`] is the seam between the pipeline and the tools that do
//! the actual compiling: Ant for the editor stages and the SDK build
//! script for SDK targets. [`ToolchainRunner`] is the real implementation.

mod ant;
pub mod properties;

pub use ant::ToolchainRunner;

use crate::context::{Arch, BuildContext};
use crate::error::Result;
use properties::RUNTIME_DIR_KEY;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Build tool stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Produce the per-platform package archives
    Package,
    /// Run the editor test suites
    Test,
    /// Produce the update site
    UpdateSite,
}

impl Stage {
    /// Release-engineering feature the stage runs from.
    pub fn feature(&self) -> &'static str {
        match self {
            Stage::Package => "com.google.dart.tools.deploy.feature_releng",
            Stage::Test => "com.google.dart.tools.tests.feature_releng",
            Stage::UpdateSite => "com.google.dart.eclipse.feature_releng",
        }
    }

    /// Build file inside the feature directory.
    pub fn build_file(&self) -> &'static str {
        match self {
            Stage::Package => "build_rcp.xml",
            Stage::Test => "buildTests.xml",
            Stage::UpdateSite => "build.xml",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Package => "package",
            Stage::Test => "test",
            Stage::UpdateSite => "update-site",
        })
    }
}

/// One build tool invocation: named parameters plus pass-through args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    /// Stage to run
    pub stage: Stage,
    /// Named parameters, in the order they are passed
    pub params: Vec<(String, String)>,
    /// Additional arguments passed verbatim before the trailing defaults
    pub extra_args: Vec<String>,
    /// Where the tool writes its side-channel results
    pub property_file: PathBuf,
}

impl StageInvocation {
    /// Invocation carrying the standard parameters for this run.
    pub fn new(stage: Stage, ctx: &BuildContext, property_file: &Path) -> Self {
        let mut params = vec![
            ("build.revision".to_string(), ctx.revision.clone()),
            ("build.builder".to_string(), ctx.builder.clone()),
            ("build.root".to_string(), ctx.build_root.display().to_string()),
            ("build.out".to_string(), ctx.out_dir.display().to_string()),
            (
                "build.source".to_string(),
                ctx.layout.editor_dir().display().to_string(),
            ),
            (
                "build.out.property.file".to_string(),
                property_file.display().to_string(),
            ),
            ("build.os".to_string(), ctx.os.as_str().to_string()),
        ];
        if ctx.automation {
            params.push(("build.running.headless".to_string(), "true".to_string()));
        }
        Self {
            stage,
            params,
            extra_args: Vec::new(),
            property_file: property_file.to_path_buf(),
        }
    }

    /// Tell the tool where the SDK archive is.
    pub fn sdk_zip(mut self, path: &Path) -> Self {
        self.params
            .push(("build.dart.sdk.zip".to_string(), path.display().to_string()));
        self
    }

    /// Tell the tool where to deposit extra artifacts.
    pub fn extra_artifacts(mut self, dir: &Path) -> Self {
        self.params
            .push(("build.extra.artifacts".to_string(), dir.display().to_string()));
        self
    }

    /// Append a verbatim argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Value of a named parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of a stage: exit status plus side-channel results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageResult {
    /// Exit status, zero on success
    pub status: i32,
    /// Parsed side-channel results
    pub properties: BTreeMap<String, String>,
}

impl StageResult {
    /// Whether the stage exited zero.
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Runtime directory reported by the tool, if any.
    pub fn runtime_dir(&self) -> Option<&Path> {
        self.properties
            .get(RUNTIME_DIR_KEY)
            .filter(|dir| !dir.is_empty())
            .map(Path::new)
    }
}

/// Runs the external build tools.
#[allow(async_fn_in_trait)]
pub trait BuildRunner {
    /// Run a build tool stage and collect its results.
    ///
    /// A non-zero exit is reported in [`StageResult::status`]; `Err` means
    /// the tool could not be run at all.
    async fn run_stage(&self, invocation: &StageInvocation) -> Result<StageResult>;

    /// Build one SDK target for the given architectures; returns the exit
    /// status.
    async fn build_sdk_target(&self, archs: &[Arch], target: &str) -> Result<i32>;
}
