//! Test doubles for host collaborators
//!
//! Stand-ins for the version-control tool, the runtime interpreter and the
//! manager snapshot tool, so provenance capture can be exercised without
//! spawning any process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::embed::{SnapshotError, SnapshotTool};
use crate::fingerprint::{RuntimeVersions, StaticRuntimeProbe, VersionOracle};

/// [`VersionOracle`] answering from fixed per-path tables
#[derive(Debug, Default)]
pub struct StubOracle {
    describes: HashMap<PathBuf, String>,
    commits: HashMap<PathBuf, String>,
    remotes: HashMap<PathBuf, String>,
    describe_calls: Arc<AtomicUsize>,
}

impl StubOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_describe(mut self, path: &Path, descriptor: &str) -> Self {
        self.describes.insert(path.to_path_buf(), descriptor.to_string());
        self
    }

    pub fn with_commit(mut self, path: &Path, commit: &str) -> Self {
        self.commits.insert(path.to_path_buf(), commit.to_string());
        self
    }

    pub fn with_remote(mut self, path: &Path, url: &str) -> Self {
        self.remotes.insert(path.to_path_buf(), url.to_string());
        self
    }

    /// Shared counter of `describe` invocations
    pub fn describe_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.describe_calls)
    }
}

impl VersionOracle for StubOracle {
    fn describe(&self, path: &Path) -> Option<String> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.describes.get(path).cloned()
    }

    fn head_commit(&self, path: &Path) -> Option<String> {
        self.commits.get(path).cloned()
    }

    fn remote_url(&self, path: &Path) -> Option<String> {
        self.remotes.get(path).cloned()
    }
}

/// Runtime versions of a typical CUDA install
pub fn sample_runtime() -> StaticRuntimeProbe {
    StaticRuntimeProbe::new(RuntimeVersions {
        runtime: "3.11.9".to_string(),
        numeric_framework: "2.3.1+cu121".to_string(),
        accelerator: "12.1".to_string(),
        device: "NVIDIA GeForce RTX 4090".to_string(),
    })
}

/// How a [`StubSnapshotTool`] behaves when invoked
#[derive(Debug, Clone)]
pub enum SnapshotBehavior {
    /// Write `name` into the directory without reporting it
    WriteSilently { name: String },
    /// Write `name` and report its path
    WriteAndReport { name: String },
    /// Exit non-zero
    Fail,
    /// Succeed without producing anything
    NoOutput,
}

/// [`SnapshotTool`] writing canned snapshot files
#[derive(Debug)]
pub struct StubSnapshotTool {
    dir: PathBuf,
    behavior: SnapshotBehavior,
    invocations: Mutex<usize>,
}

impl StubSnapshotTool {
    pub fn new(dir: &Path, behavior: SnapshotBehavior) -> Self {
        Self {
            dir: dir.to_path_buf(),
            behavior,
            invocations: Mutex::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.lock().map(|n| *n).unwrap_or(0)
    }
}

impl SnapshotTool for StubSnapshotTool {
    fn snapshot_dir(&self) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        Ok(self.dir.clone())
    }

    fn save_snapshot(&self) -> Result<Option<PathBuf>, SnapshotError> {
        if let Ok(mut n) = self.invocations.lock() {
            *n += 1;
        }
        match &self.behavior {
            SnapshotBehavior::WriteSilently { name } => {
                fs::write(self.dir.join(name), "{\"comfyui\":\"abc\"}")?;
                Ok(None)
            }
            SnapshotBehavior::WriteAndReport { name } => {
                let path = self.dir.join(name);
                fs::write(&path, "{\"comfyui\":\"abc\"}")?;
                Ok(Some(path))
            }
            SnapshotBehavior::Fail => Err(SnapshotError::ToolFailed {
                status: Some(1),
                stderr: "stub failure".to_string(),
            }),
            SnapshotBehavior::NoOutput => Ok(None),
        }
    }
}
