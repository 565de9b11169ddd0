//! # editor_release
//!
//! Release-build orchestrator for the editor.
//!
//! Given a revision, a builder name and an output directory, the pipeline
//! drives the external build tools through SDK compilation, packaging and
//! tests, merges independently built trees into the package archives and
//! publishes the results to an object store under a revision-pinned prefix
//! and the `latest` alias.
//!
//! ## Features
//!
//! - **Scoped cleanup**: every temporary path is removed on every exit path
//! - **Table-driven merging**: SDK, runtime and final names keyed by file name
//! - **Pinned-then-latest publication**: `latest` is only written from a
//!   completed pinned copy
//! - **Pluggable collaborators**: build tools and object store behind traits
//!
//! ## Usage
//!
//! ```bash
//! editor_release -r 12345 -n dart-editor-linux -o out
//! editor_release -r 12345 -n dart-editor -o out --store-root /tmp/store
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod archive;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod publish;
pub mod sdk;
pub mod store;
pub mod toolchain;
pub mod utils;

pub use archive::PackageArchive;
pub use cli::{Args, OutputManager};
pub use config::{EnvConfig, TimeoutConfig};
pub use context::{Arch, BuildContext, BuildMode, BuilderRole, HostOs, RunRequest};
pub use error::{ReleaseError, Result};
pub use merge::ArtifactMerger;
pub use pipeline::ReleasePipeline;
pub use publish::{PublishManifest, PublishTarget, Publisher};
pub use sdk::SdkAssembler;
pub use store::{AccessPolicy, FsStore, GsutilStore, Location, ObjectStore};
pub use toolchain::{BuildRunner, Stage, StageInvocation, StageResult, ToolchainRunner};
