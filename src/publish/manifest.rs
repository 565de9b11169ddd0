use super::PublishReceipt;
use crate::context::BuildContext;
use crate::error::{ErrorExt, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manifest file written to the output directory.
pub const MANIFEST_FILE: &str = "publish-manifest.json";

/// Summary of what a run published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishManifest {
    /// Normalized revision
    pub revision: String,
    /// Builder name
    pub builder: String,
    /// Host OS token
    pub os: String,
    /// Pinned prefix
    pub pinned: String,
    /// Latest prefix
    pub latest: String,
    /// When the manifest was written
    pub generated_at: DateTime<Utc>,
    /// Published files, in publication order
    pub artifacts: Vec<PublishReceipt>,
    /// Published tree prefixes
    pub trees: Vec<String>,
}

impl PublishManifest {
    /// Manifest for a run.
    pub fn new(
        ctx: &BuildContext,
        pinned: &str,
        latest: &str,
        artifacts: &[PublishReceipt],
        trees: &[String],
    ) -> Self {
        Self {
            revision: ctx.revision.clone(),
            builder: ctx.builder.clone(),
            os: ctx.os.to_string(),
            pinned: pinned.to_string(),
            latest: latest.to_string(),
            generated_at: Utc::now(),
            artifacts: artifacts.to_vec(),
            trees: trees.to_vec(),
        }
    }

    /// Write as pretty JSON into `out_dir`; returns the file path.
    pub async fn write(&self, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .fs_context("writing manifest", &path)?;
        Ok(path)
    }

    /// Read a manifest back.
    pub async fn read(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .fs_context("reading manifest", path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
