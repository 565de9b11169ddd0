//! Command line argument parsing and validation.
//!
//! Revision, builder name and output directory are optional at the parser
//! level so that each one missing maps to its own exit code.

use crate::context::{BuildMode, RunRequest, UnmatchedRuntimePolicy};
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Release build orchestrator for the editor
#[derive(Parser, Debug, Clone)]
#[command(
    name = "editor_release",
    version,
    about = "Build, package and publish an editor release",
    long_about = "Builds the SDK, packages the editor, merges SDK and runtime into the
package archives, runs the tests and publishes everything to the object store
under both a revision-pinned prefix and the latest alias.

Usage:
  editor_release -r 12345 -n dart-editor-linux -o out
  editor_release -r 12345 -n dart-editor -o out          # update site only
  editor_release -r 12345 -n dart-editor-linux -o out --store-root /tmp/store"
)]
pub struct Args {
    /// SDK build mode
    #[arg(short, long, value_enum, default_value_t = BuildMode::Release)]
    pub mode: BuildMode,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Revision being built
    #[arg(short, long, value_name = "REVISION")]
    pub revision: Option<String>,

    /// Builder name
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    /// Output directory for build artifacts
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Store base path to publish to
    #[arg(short, long, value_name = "URL")]
    pub dest: Option<String>,

    /// Source checkout root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub source_root: Option<PathBuf>,

    /// Scratch build tree (defaults to <source-root>/build_root)
    #[arg(long, value_name = "DIR")]
    pub build_root: Option<PathBuf>,

    /// Stop after packaging; no SDK or runtime installation
    #[arg(long)]
    pub headless: bool,

    /// Listing pattern for runtime archives
    #[arg(long, value_name = "PATTERN")]
    pub runtime_store: Option<String>,

    /// Bucket for the API documentation
    #[arg(long, value_name = "URL")]
    pub api_docs_dest: Option<String>,

    /// Do not build or publish the API documentation
    #[arg(long)]
    pub skip_api_docs: bool,

    /// What to do with a package archive no runtime matches
    #[arg(long, value_enum, default_value_t = UnmatchedRuntimePolicy::Skip)]
    pub unmatched_runtime: UnmatchedRuntimePolicy,

    /// Access policy file applied to published objects
    #[arg(long, value_name = "FILE")]
    pub acl_file: Option<PathBuf>,

    /// Publish into a local directory tree instead of the remote store
    #[arg(long, value_name = "DIR", env = "EDITOR_RELEASE_STORE_ROOT")]
    pub store_root: Option<PathBuf>,

    /// Positional arguments are rejected
    #[arg(hide = true, value_name = "ARGS")]
    pub positional: Vec<String>,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Reject positional arguments.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.positional.is_empty() {
            return Err(ConfigError::UnexpectedArguments {
                args: self.positional.clone(),
            });
        }
        Ok(())
    }
}

impl From<&Args> for RunRequest {
    fn from(args: &Args) -> Self {
        RunRequest {
            revision: args.revision.clone(),
            name: args.name.clone(),
            out: args.out.clone(),
            dest: args.dest.clone(),
            source_root: args.source_root.clone(),
            build_root: args.build_root.clone(),
            mode: args.mode,
            headless: args.headless,
            runtime_store: args.runtime_store.clone(),
            api_docs_dest: args.api_docs_dest.clone(),
            skip_api_docs: args.skip_api_docs,
            unmatched_runtime: args.unmatched_runtime,
            acl_file: args.acl_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_map_to_request() {
        let args = Args::try_parse_from([
            "editor_release", "-r", "123M", "-n", "dart-editor-linux", "-o", "out", "-m", "debug",
        ])
        .unwrap();
        assert!(args.validate().is_ok());
        let request = RunRequest::from(&args);
        assert_eq!(request.revision.as_deref(), Some("123M"));
        assert_eq!(request.name.as_deref(), Some("dart-editor-linux"));
        assert_eq!(request.mode, BuildMode::Debug);
        assert_eq!(request.unmatched_runtime, UnmatchedRuntimePolicy::Skip);
    }

    #[test]
    fn required_options_are_optional_to_the_parser() {
        let args = Args::try_parse_from(["editor_release"]).unwrap();
        assert!(args.revision.is_none());
        assert!(args.name.is_none());
        assert!(args.out.is_none());
    }

    #[test]
    fn positional_arguments_are_rejected() {
        let args = Args::try_parse_from(["editor_release", "-r", "1", "stray"]).unwrap();
        let err = args.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedArguments { ref args } if args == &["stray"]));
    }

    #[test]
    fn unmatched_runtime_policy_parses() {
        let args =
            Args::try_parse_from(["editor_release", "--unmatched-runtime", "fail"]).unwrap();
        assert_eq!(args.unmatched_runtime, UnmatchedRuntimePolicy::Fail);
    }
}
