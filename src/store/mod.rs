//! Object store client.
//!
//! The pipeline talks to the remote store only through [`ObjectStore`]:
//! copy, list, remove and access-policy updates. Remote objects are
//! addressed by URL (`gs://bucket/path`); local files by path.

mod fs;
mod gsutil;

pub use fs::FsStore;
pub use gsutil::GsutilStore;

use crate::error::Result;
use std::fmt;
use std::path::PathBuf;

/// Source or destination of a store copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A path on the local filesystem
    Local(PathBuf),
    /// A store URL
    Remote(String),
}

impl Location {
    /// Local path location.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Location::Local(path.into())
    }

    /// Store URL location.
    pub fn remote(url: impl Into<String>) -> Self {
        Location::Remote(url.into())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(url) => f.write_str(url),
        }
    }
}

/// Access policy applied to published objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// A named policy understood by the store (e.g. `public-read`)
    Canned(String),
    /// A policy document on disk, pushed as-is
    PolicyFile(PathBuf),
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPolicy::Canned(name) => f.write_str(name),
            AccessPolicy::PolicyFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Operations the pipeline needs from a remote object store.
///
/// Copies are whole-object and idempotent: copying the same bytes to the
/// same destination twice leaves the store in the same state.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    /// Copy `from` to `to`.
    ///
    /// Without `recursive` the destination names exactly one object. With
    /// `recursive` the source's last path component is placed under the
    /// destination prefix.
    async fn copy(&self, from: &Location, to: &Location, recursive: bool) -> Result<()>;

    /// URLs of the objects matching a glob-like pattern, sorted. No match
    /// is an empty list, not an error.
    async fn list(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove objects matching a pattern.
    async fn remove(&self, pattern: &str, recursive: bool) -> Result<()>;

    /// Apply an access policy to one object.
    async fn set_access_policy(&self, object: &str, policy: &AccessPolicy) -> Result<()>;
}

/// Append a path segment to a store URL.
pub fn join(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

/// Last path component of a store URL.
pub fn object_name(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
}
