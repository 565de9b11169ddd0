//! Per-run build configuration.
//!
//! [`BuildContext`] is resolved once from the command line and the
//! environment, then passed by reference to every stage. Nothing in it
//! changes after resolution.

use crate::config::{EnvConfig, TimeoutConfig};
use crate::error::{ConfigError, Result};
use crate::store::AccessPolicy;
use std::fmt;
use std::path::{Path, PathBuf};

/// Builder name that only produces the update site.
pub const EDITOR_ONLY_BUILDER: &str = "dart-editor";

/// Bucket used by automation accounts.
pub const CONTINUOUS_BUCKET: &str = "gs://dart-editor-archive-continuous";

/// Bucket used by everyone else.
pub const TESTING_BUCKET: &str = "gs://dart-editor-archive-testing";

/// Value exported as `DART_LOCAL_BUILD` for non-automation runs.
pub const LOCAL_BUILD_MARKER: &str = "dart-editor-archive-testing";

/// Default runtime listing pattern.
pub const DEFAULT_RUNTIME_STORE: &str = "gs://dartium-archive/latest/dartium-*-full-[0-9]*.zip";

/// Default API documentation bucket.
pub const DEFAULT_API_DOCS_BUCKET: &str = "gs://dartlang-api-docs";

/// Operating system the build runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    /// Linux (gtk)
    Linux,
    /// macOS (cocoa)
    MacOs,
    /// Windows (win32)
    Win32,
}

impl HostOs {
    /// Detect the host OS, `None` on unsupported platforms.
    pub fn current() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => Some(HostOs::Linux),
            "macos" => Some(HostOs::MacOs),
            "windows" => Some(HostOs::Win32),
            _ => None,
        }
    }

    /// Token used in artifact names and build parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::MacOs => "macos",
            HostOs::Win32 => "win32",
        }
    }

    /// Directory the SDK build script writes its outputs to.
    pub fn sdk_output_dir(&self) -> &'static str {
        match self {
            HostOs::Linux => "out",
            HostOs::MacOs => "xcodebuild",
            HostOs::Win32 => "build",
        }
    }

    /// Whether SDK archives are also produced as tarballs.
    pub fn ships_tarballs(&self) -> bool {
        !matches!(self, HostOs::Win32)
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture of an SDK build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// 32-bit x86
    Ia32,
    /// 64-bit x86
    X64,
}

impl Arch {
    /// Name understood by the SDK build script.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
        }
    }

    /// Pointer width, used in artifact names.
    pub fn bits(&self) -> u32 {
        match self {
            Arch::Ia32 => 32,
            Arch::X64 => 64,
        }
    }

    fn dir_suffix(&self) -> &'static str {
        match self {
            Arch::Ia32 => "IA32",
            Arch::X64 => "X64",
        }
    }

    /// Comma-joined list as passed to `--arch`.
    pub fn join(archs: &[Arch]) -> String {
        archs.iter().map(Arch::as_str).collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SDK build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BuildMode {
    /// Unoptimized build
    Debug,
    /// Optimized build
    #[default]
    Release,
}

impl BuildMode {
    /// Name understood by the SDK build script.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    }

    fn dir_prefix(&self) -> &'static str {
        match self {
            BuildMode::Debug => "Debug",
            BuildMode::Release => "Release",
        }
    }
}

/// What the builder is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderRole {
    /// Update site only; no SDK, runtime or tests
    EditorOnly,
    /// Full per-OS editor build
    Full,
}

impl BuilderRole {
    /// Role for a builder name.
    pub fn for_builder(name: &str) -> Self {
        if name == EDITOR_ONLY_BUILDER {
            BuilderRole::EditorOnly
        } else {
            BuilderRole::Full
        }
    }
}

/// What to do with a package archive no runtime rule recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UnmatchedRuntimePolicy {
    /// Log a warning and publish the archive without a runtime
    #[default]
    Skip,
    /// Abort the run
    Fail,
}

/// Normalize a revision string for use as a path component.
///
/// Trailing whitespace is dropped, then one trailing alphabetic suffix
/// character, then everything from the first `:` on.
pub fn normalize_revision(raw: &str) -> Result<String> {
    let mut revision = raw.trim_end();
    if let Some(last) = revision.chars().last()
        && last.is_alphabetic()
    {
        revision = &revision[..revision.len() - last.len_utf8()];
    }
    if let Some(index) = revision.find(':') {
        revision = &revision[..index];
    }
    if revision.is_empty() {
        return Err(ConfigError::InvalidRevision {
            revision: raw.to_string(),
            reason: "nothing left after normalization".to_string(),
        }
        .into());
    }
    Ok(revision.to_string())
}

/// Well-known locations inside a source checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    root: PathBuf,
}

impl SourceLayout {
    /// Layout rooted at a checkout directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Checkout root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Editor sources.
    pub fn editor_dir(&self) -> PathBuf {
        self.root.join("editor")
    }

    /// Default access policy file.
    pub fn acl_file(&self) -> PathBuf {
        self.editor_dir().join("build").join("acl.xml")
    }

    /// Bundled Ant launcher directory.
    pub fn ant_bin_dir(&self) -> PathBuf {
        self.root
            .join("third_party")
            .join("apache_ant")
            .join("v1_7_1")
            .join("bin")
    }

    /// bzip2 support jar passed to Ant.
    pub fn bzip2_jar(&self) -> PathBuf {
        self.root.join("third_party").join("bzip2").join("bzip2.jar")
    }

    /// Bundled gsutil script.
    pub fn gsutil_script(&self) -> PathBuf {
        self.root.join("third_party").join("gsutil").join("gsutil")
    }

    /// SDK build script.
    pub fn sdk_build_script(&self) -> PathBuf {
        self.root.join("tools").join("build.py")
    }

    /// Directory holding a release-engineering feature.
    pub fn feature_dir(&self, feature: &str) -> PathBuf {
        self.editor_dir().join("tools").join("features").join(feature)
    }

    /// Output directory of one SDK build configuration.
    pub fn sdk_build_dir(&self, os: HostOs, mode: BuildMode, arch: Arch) -> PathBuf {
        self.root
            .join(os.sdk_output_dir())
            .join(format!("{}{}", mode.dir_prefix(), arch.dir_suffix()))
    }

    /// SDK tree produced by `create_sdk`.
    pub fn sdk_tree(&self, os: HostOs, mode: BuildMode, arch: Arch) -> PathBuf {
        self.sdk_build_dir(os, mode, arch).join("dart-sdk")
    }
}

/// Command-line inputs before validation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Raw revision identifier
    pub revision: Option<String>,
    /// Builder name
    pub name: Option<String>,
    /// Output directory
    pub out: Option<PathBuf>,
    /// Store base path override
    pub dest: Option<String>,
    /// Checkout root (defaults to the current directory)
    pub source_root: Option<PathBuf>,
    /// Scratch tree (defaults to `<source-root>/build_root`)
    pub build_root: Option<PathBuf>,
    /// SDK build mode
    pub mode: BuildMode,
    /// Stop after packaging
    pub headless: bool,
    /// Runtime listing pattern override
    pub runtime_store: Option<String>,
    /// API documentation bucket override
    pub api_docs_dest: Option<String>,
    /// Skip API documentation
    pub skip_api_docs: bool,
    /// Unmatched runtime handling
    pub unmatched_runtime: UnmatchedRuntimePolicy,
    /// Access policy file override
    pub acl_file: Option<PathBuf>,
}

/// Immutable configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Normalized revision, used as the pinned path component
    pub revision: String,
    /// Builder name as given
    pub builder: String,
    /// Role derived from the builder name
    pub role: BuilderRole,
    /// Host operating system
    pub os: HostOs,
    /// Architectures produced on this host
    pub archs: Vec<Arch>,
    /// SDK build mode
    pub mode: BuildMode,
    /// Source checkout layout
    pub layout: SourceLayout,
    /// Scratch tree removed at the end of the run
    pub build_root: PathBuf,
    /// Directory receiving build outputs
    pub out_dir: PathBuf,
    /// Destination bucket
    pub bucket: String,
    /// Access policy applied to every published object
    pub access_policy: AccessPolicy,
    /// Runtime listing pattern
    pub runtime_store: String,
    /// API documentation bucket, `None` when docs are skipped
    pub api_docs_dest: Option<String>,
    /// Unmatched runtime handling
    pub unmatched_runtime: UnmatchedRuntimePolicy,
    /// Skip the test stage
    pub skip_tests: bool,
    /// Install SDK and runtime even for the editor-only role
    pub force_install: bool,
    /// Running under an automation account
    pub automation: bool,
    /// No per-OS build; stop after packaging
    pub headless: bool,
    /// `DART_LOCAL_BUILD` value exported to child processes
    pub local_build: Option<String>,
    /// Extra build tool arguments
    pub extra_build_args: Vec<String>,
    /// Child process time budgets
    pub timeouts: TimeoutConfig,
}

impl BuildContext {
    /// Validate inputs and resolve the run configuration.
    ///
    /// Checks happen in a fixed order so the first missing input decides
    /// the exit code: revision, builder name, output directory, identity.
    pub fn resolve(
        request: RunRequest,
        env: &EnvConfig,
        timeouts: TimeoutConfig,
        os: HostOs,
    ) -> Result<Self> {
        let raw_revision = request.revision.ok_or(ConfigError::MissingRevision)?;
        let builder = request.name.ok_or(ConfigError::MissingBuilderName)?;
        let out = request.out.ok_or(ConfigError::MissingOutputDirectory)?;
        let username = env.username.clone().ok_or(ConfigError::MissingUsername)?;

        let revision = normalize_revision(&raw_revision)?;
        let source_root = match request.source_root {
            Some(root) => std::path::absolute(root)?,
            None => std::env::current_dir()?,
        };
        let layout = SourceLayout::new(source_root);
        let build_root = match request.build_root {
            Some(root) => std::path::absolute(root)?,
            None => layout.root().join("build_root"),
        };
        let out_dir = std::path::absolute(out)?;

        let automation = username.starts_with("chrome");
        let default_bucket = if automation {
            CONTINUOUS_BUCKET
        } else {
            TESTING_BUCKET
        };
        let bucket = request
            .dest
            .map(|dest| dest.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default_bucket.to_string());
        let local_build = (!automation).then(|| LOCAL_BUILD_MARKER.to_string());

        let access_policy = AccessPolicy::PolicyFile(
            request.acl_file.unwrap_or_else(|| layout.acl_file()),
        );
        let api_docs_dest = (!request.skip_api_docs).then(|| {
            request
                .api_docs_dest
                .unwrap_or_else(|| DEFAULT_API_DOCS_BUCKET.to_string())
        });

        Ok(Self {
            revision,
            role: BuilderRole::for_builder(&builder),
            builder,
            os,
            archs: vec![Arch::Ia32, Arch::X64],
            mode: request.mode,
            layout,
            build_root,
            out_dir,
            bucket,
            access_policy,
            runtime_store: request
                .runtime_store
                .unwrap_or_else(|| DEFAULT_RUNTIME_STORE.to_string()),
            api_docs_dest,
            unmatched_runtime: request.unmatched_runtime,
            skip_tests: env.skip_tests,
            force_install: env.force_install,
            automation,
            headless: request.headless,
            local_build,
            extra_build_args: env.extra_build_args.clone(),
            timeouts,
        })
    }

    /// Whether the full build runs, merging SDK and runtime into the
    /// package archives. The editor-only role builds the update site
    /// instead unless installation is forced.
    pub fn installs_artifacts(&self) -> bool {
        self.force_install || self.role != BuilderRole::EditorOnly
    }

    /// Local scratch directory for unpacked merge sources.
    pub fn scratch_dir(&self) -> PathBuf {
        self.build_root.join("tmp")
    }
}
