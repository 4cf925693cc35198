//! Plain-text environment snapshot
//!
//! Lists exact commits (not describe output) for the host and every
//! version-controlled extension, so an install can be rebuilt revision by
//! revision. Saved as `comfyui_snapshot.txt` at the host root and copied next
//! to images as `<stem>.snapshot.txt`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::fingerprint::{
    extension_dirs, FingerprintCache, RuntimeProbe, VersionOracle, NO_ACCELERATOR, NO_DEVICE,
    UNKNOWN,
};

/// File name of the snapshot at the host root
pub const SNAPSHOT_FILE: &str = "comfyui_snapshot.txt";

/// Remote recorded for the host when `origin` is not configured
pub const DEFAULT_HOST_REMOTE: &str = "https://github.com/comfyanonymous/ComfyUI.git";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRevision {
    pub name: String,
    pub commit: String,
    pub remote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub runtime: String,
    pub numeric_framework: String,
    pub accelerator: String,
    pub device: String,
    pub host_commit: Option<String>,
    pub host_remote: Option<String>,
    pub extensions: Vec<ExtensionRevision>,
}

impl EnvironmentSnapshot {
    /// Query the runtime and every repository under `extensions_root`.
    ///
    /// Extensions without a resolvable commit are left out.
    pub fn capture(
        root: &Path,
        extensions_root: &Path,
        oracle: &dyn VersionOracle,
        runtime: &dyn RuntimeProbe,
    ) -> Self {
        let versions = runtime.probe();

        let extensions = extension_dirs(extensions_root)
            .into_iter()
            .filter_map(|(name, path)| {
                let commit = oracle.head_commit(&path)?;
                Some(ExtensionRevision {
                    name,
                    commit,
                    remote: oracle.remote_url(&path),
                })
            })
            .collect();

        Self {
            runtime: versions.runtime,
            numeric_framework: versions.numeric_framework,
            accelerator: versions.accelerator,
            device: versions.device,
            host_commit: oracle.head_commit(root),
            host_remote: oracle.remote_url(root),
            extensions,
        }
    }

    /// [`capture`](Self::capture) using a cache's collaborators
    pub fn from_cache(cache: &FingerprintCache) -> Self {
        Self::capture(
            cache.root(),
            &cache.extensions_root(),
            cache.oracle(),
            cache.runtime(),
        )
    }

    pub fn render(&self) -> String {
        let accelerator = if self.accelerator == NO_ACCELERATOR {
            NO_DEVICE
        } else {
            self.accelerator.as_str()
        };

        let mut lines = vec![
            format!("Python: {}", self.runtime),
            format!("PyTorch: {}", self.numeric_framework),
            format!("CUDA: {}", accelerator),
            format!("GPU: {}", self.device),
            String::new(),
            format!(
                "ComfyUI {} {}",
                self.host_commit.as_deref().unwrap_or(UNKNOWN),
                self.host_remote.as_deref().unwrap_or(DEFAULT_HOST_REMOTE)
            ),
            String::new(),
        ];

        for ext in &self.extensions {
            match &ext.remote {
                Some(remote) => lines.push(format!("{} {} {}", ext.name, ext.commit, remote)),
                None => lines.push(format!("{} {}", ext.name, ext.commit)),
            }
        }

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    /// Write the rendered snapshot to `<root>/comfyui_snapshot.txt`
    pub fn write(&self, root: &Path) -> io::Result<PathBuf> {
        let path = root.join(SNAPSHOT_FILE);
        fs::write(&path, self.render())?;
        tracing::info!(path = %path.display(), "environment snapshot written");
        Ok(path)
    }
}
