//! Error types for editor_release operations.
//!
//! Errors fall into the families the pipeline reacts to differently:
//! configuration errors (detected before anything is allocated), stage
//! failures (a build tool returned non-zero or could not run), integrity
//! failures (an expected artifact is missing) and collaborator errors from
//! the archive and object-store services.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for editor_release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Process exit codes reported by the CLI.
pub mod exit_code {
    /// Run completed successfully
    pub const SUCCESS: i32 = 0;
    /// Unexpected failure (integrity, archive, store, IO)
    pub const FAILURE: i32 = 1;
    /// Positional arguments were given; only options are accepted
    pub const UNEXPECTED_ARGUMENTS: i32 = 2;
    /// `--revision` missing
    pub const MISSING_REVISION: i32 = 3;
    /// `--name` missing
    pub const MISSING_BUILDER_NAME: i32 = 4;
    /// `--out` missing
    pub const MISSING_OUTPUT_DIRECTORY: i32 = 5;
    /// Neither `USER` nor `USERNAME` is set
    pub const MISSING_USERNAME: i32 = 6;
    /// The packaging stage produced no package archives
    pub const NO_PACKAGE_ARCHIVES: i32 = 7;
}

/// Main error type for all editor_release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Missing or invalid run configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// External build stage failures
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Expected artifacts that are missing or malformed
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Archive read/write errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Object store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem error with path context
    #[error("{context} {path}: {source}")]
    Fs {
        /// Operation being performed (e.g., "creating output directory")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors, detected before any external invocation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Positional arguments were passed
    #[error("only options should be passed to this program, got: {args:?}")]
    UnexpectedArguments {
        /// The offending arguments
        args: Vec<String>,
    },

    /// No revision was given
    #[error("missing revision option")]
    MissingRevision,

    /// No builder name was given
    #[error("missing builder name")]
    MissingBuilderName,

    /// No output directory was given
    #[error("missing output directory")]
    MissingOutputDirectory,

    /// The current user could not be determined
    #[error("could not find the username; tried environment variables USER and USERNAME")]
    MissingUsername,

    /// A revision that normalizes to nothing
    #[error("invalid revision '{revision}': {reason}")]
    InvalidRevision {
        /// Revision as given
        revision: String,
        /// Reason for the error
        reason: String,
    },

    /// Any other invalid argument
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

/// Failures of external build invocations
#[derive(Error, Debug)]
pub enum StageError {
    /// The tool binary could not be located
    #[error("{tool} not found: {reason}")]
    ToolNotFound {
        /// Tool name
        tool: String,
        /// Reason for the error
        reason: String,
    },

    /// The process could not be spawned or waited on
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// Command line
        command: String,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its time budget and was killed
    #[error("{command} timed out after {seconds}s")]
    TimedOut {
        /// Command line
        command: String,
        /// Timeout that was exceeded
        seconds: u64,
    },

    /// An SDK build target returned non-zero
    #[error("SDK build failed: target '{target}' exited with status {status}")]
    SdkBuildFailed {
        /// Build target
        target: String,
        /// Exit status of the build script
        status: i32,
    },

    /// The build tool wrote no side-channel results
    #[error("no data was found in property file {path}")]
    NoProperties {
        /// Property file path
        path: PathBuf,
    },
}

/// Expected artifacts that are absent or do not have the expected shape
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// Packaging produced no package archives
    #[error("could not find any zipped up RCP files in {dir}; the packaging build must have failed")]
    NoPackageArchives {
        /// Output directory that was searched
        dir: PathBuf,
    },

    /// A package archive name outside the fixed naming table
    #[error("unrecognized package archive name '{name}'")]
    UnknownPackageArchive {
        /// File name
        name: String,
    },

    /// An SDK tree the build was supposed to produce
    #[error("could not find SDK tree {path}")]
    MissingSdkTree {
        /// Expected directory
        path: PathBuf,
    },

    /// The update-site stage succeeded without producing a site
    #[error("could not find update site {path}")]
    MissingUpdateSite {
        /// Expected site directory
        path: PathBuf,
    },

    /// An SDK archive needed for injection
    #[error("could not find SDK archive {path}")]
    MissingSdkArchive {
        /// Expected archive path
        path: PathBuf,
    },

    /// The runtime store listing came back empty
    #[error("could not find any runtime archives matching {pattern}")]
    NoRuntimeArchives {
        /// Listing pattern
        pattern: String,
    },

    /// A runtime rule matched but no remote archive carries its prefix
    #[error("no runtime archive with prefix '{prefix}' for package archive '{archive}'")]
    RuntimeNotFound {
        /// Package archive file name
        archive: String,
        /// Runtime name prefix searched for
        prefix: String,
    },

    /// No runtime rule applies and the policy forbids skipping
    #[error("no runtime rule matches package archive '{archive}'")]
    UnmatchedRuntime {
        /// Package archive file name
        archive: String,
    },

    /// The unpacked runtime archive lacks the expected product directory
    #[error("unexpected runtime layout in {dir}: {reason}")]
    RuntimeLayout {
        /// Unpack directory
        dir: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// Archive service errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Zip container error
    #[error("{path}: {source}")]
    Zip {
        /// Archive path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: zip::result::ZipError,
    },

    /// Filesystem error with path context
    #[error("{context} {path}: {source}")]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path being accessed
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal error
    #[error("{0}")]
    Walk(#[from] walkdir::Error),

    /// Path prefix stripping error
    #[error("{0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Path that cannot be represented as an archive entry name
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// Blocking archive task panicked or was cancelled
    #[error("archive task failed: {0}")]
    Join(String),
}

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store client returned non-zero
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// Command line
        command: String,
        /// Exit status
        status: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The store client could not be spawned
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// Command line
        command: String,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The store client exceeded its time budget
    #[error("{command} timed out after {seconds}s")]
    TimedOut {
        /// Command line
        command: String,
        /// Timeout that was exceeded
        seconds: u64,
    },

    /// Source object does not exist
    #[error("object not found: {location}")]
    NotFound {
        /// Missing location
        location: String,
    },

    /// Invalid listing pattern
    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A local source that cannot be copied as requested
    #[error("cannot copy {location}: {reason}")]
    InvalidCopy {
        /// Source location
        location: String,
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Exit code the CLI reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ReleaseError::Config(ConfigError::UnexpectedArguments { .. }) => {
                exit_code::UNEXPECTED_ARGUMENTS
            }
            ReleaseError::Config(ConfigError::MissingRevision) => exit_code::MISSING_REVISION,
            ReleaseError::Config(ConfigError::MissingBuilderName) => {
                exit_code::MISSING_BUILDER_NAME
            }
            ReleaseError::Config(ConfigError::MissingOutputDirectory) => {
                exit_code::MISSING_OUTPUT_DIRECTORY
            }
            ReleaseError::Config(ConfigError::MissingUsername) => exit_code::MISSING_USERNAME,
            ReleaseError::Integrity(IntegrityError::NoPackageArchives { .. }) => {
                exit_code::NO_PACKAGE_ARCHIVES
            }
            ReleaseError::Stage(StageError::SdkBuildFailed { status, .. }) if *status != 0 => {
                *status
            }
            _ => exit_code::FAILURE,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Config(ConfigError::MissingUsername) => vec![
                "Export USER (Linux/macOS) or USERNAME (Windows) before running".to_string(),
            ],
            ReleaseError::Config(_) => {
                vec!["Run with --help to see the required options".to_string()]
            }
            ReleaseError::Stage(StageError::ToolNotFound { tool, .. }) => vec![
                format!("Install {} or make sure it is on PATH", tool),
                "Check --source-root points at a full checkout with third_party/".to_string(),
            ],
            ReleaseError::Stage(StageError::TimedOut { .. })
            | ReleaseError::Store(StoreError::TimedOut { .. }) => vec![
                "Raise EDITOR_RELEASE_STAGE_TIMEOUT_SECS / EDITOR_RELEASE_SDK_TIMEOUT_SECS / \
                 EDITOR_RELEASE_STORE_TIMEOUT_SECS"
                    .to_string(),
            ],
            ReleaseError::Integrity(IntegrityError::NoPackageArchives { .. }) => vec![
                "Inspect the packaging stage log above; it exited 0 without writing archives"
                    .to_string(),
            ],
            ReleaseError::Integrity(IntegrityError::UnmatchedRuntime { .. }) => vec![
                "Pass --unmatched-runtime skip to publish archives without a runtime".to_string(),
            ],
            ReleaseError::Store(StoreError::CommandFailed { .. }) => vec![
                "Verify gsutil credentials: gsutil ls <bucket>".to_string(),
                "Re-run the whole pipeline; pinned objects are overwritten idempotently"
                    .to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

/// Attach path context to filesystem results.
pub trait ErrorExt<T> {
    /// Wrap an I/O error with the operation and the path involved.
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| ReleaseError::Fs {
            context,
            path: path.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_have_distinct_codes() {
        let codes = [
            ReleaseError::from(ConfigError::MissingRevision).exit_code(),
            ReleaseError::from(ConfigError::MissingBuilderName).exit_code(),
            ReleaseError::from(ConfigError::MissingOutputDirectory).exit_code(),
            ReleaseError::from(ConfigError::MissingUsername).exit_code(),
        ];
        assert_eq!(codes, [3, 4, 5, 6]);
    }

    #[test]
    fn no_package_archives_maps_to_seven() {
        let err = ReleaseError::from(IntegrityError::NoPackageArchives {
            dir: PathBuf::from("out"),
        });
        assert_eq!(err.exit_code(), exit_code::NO_PACKAGE_ARCHIVES);
    }

    #[test]
    fn sdk_build_failure_propagates_status() {
        let err = ReleaseError::from(StageError::SdkBuildFailed {
            target: "create_sdk".to_string(),
            status: 42,
        });
        assert_eq!(err.exit_code(), 42);
    }

    #[test]
    fn other_failures_map_to_one() {
        let err = ReleaseError::from(IntegrityError::NoRuntimeArchives {
            pattern: "gs://x/*".to_string(),
        });
        assert_eq!(err.exit_code(), exit_code::FAILURE);
    }
}
