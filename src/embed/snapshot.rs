//! Environment-manager snapshot capture
//!
//! The manager's CLI writes a snapshot into its own directory under a name it
//! chooses. We run it, work out which file it produced and rename that file
//! after the image it belongs to.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use fmj_guard::{ensure_within, is_within, GuardError};
use regex_lite::Regex;

use crate::config::ProvenanceConfig;

/// Suffix appended to the image stem for renamed snapshots
pub const SNAPSHOT_SUFFIX: &str = ".snapshot.json";

/// Errors from the optional snapshot step
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot tool not found at {0}")]
    ToolMissing(PathBuf),

    #[error("snapshot tool exited with status {status:?}: {stderr}")]
    ToolFailed { status: Option<i32>, stderr: String },

    #[error("no new snapshot appeared in {0}")]
    NoNewSnapshot(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Guard(#[from] GuardError),
}

/// A tool that writes environment snapshots into a directory
pub trait SnapshotTool {
    /// Directory the tool writes into; created if missing
    fn snapshot_dir(&self) -> Result<PathBuf, SnapshotError>;

    /// Run the tool to completion. Returns the produced file when the tool
    /// reports one.
    fn save_snapshot(&self) -> Result<Option<PathBuf>, SnapshotError>;
}

/// The manager extension's `cm-cli.py save-snapshot`
#[derive(Debug, Clone)]
pub struct ManagerSnapshotTool {
    root: PathBuf,
    python: String,
    cli: PathBuf,
    snapshot_dirs: Vec<PathBuf>,
}

impl ManagerSnapshotTool {
    pub fn new(root: PathBuf, python: String, cli: PathBuf, snapshot_dirs: Vec<PathBuf>) -> Self {
        Self {
            root,
            python,
            cli,
            snapshot_dirs,
        }
    }

    pub fn from_config(config: &ProvenanceConfig, root: &Path) -> Self {
        let cli = root
            .join(&config.host.extensions_dir)
            .join(&config.manager.extension)
            .join(&config.manager.cli_script);
        let snapshot_dirs = config
            .manager
            .snapshot_dirs
            .iter()
            .map(|d| root.join(d))
            .collect();
        Self::new(
            root.to_path_buf(),
            config.host.python.clone(),
            cli,
            snapshot_dirs,
        )
    }
}

impl SnapshotTool for ManagerSnapshotTool {
    fn snapshot_dir(&self) -> Result<PathBuf, SnapshotError> {
        let dir = self
            .snapshot_dirs
            .iter()
            .find(|d| d.is_dir())
            .or_else(|| self.snapshot_dirs.last())
            .cloned()
            .unwrap_or_else(|| self.root.join("snapshots"));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn save_snapshot(&self) -> Result<Option<PathBuf>, SnapshotError> {
        if !self.cli.is_file() {
            return Err(SnapshotError::ToolMissing(self.cli.clone()));
        }

        tracing::debug!(cli = %self.cli.display(), "running manager save-snapshot");
        let output = Command::new(&self.python)
            .arg(&self.cli)
            .arg("save-snapshot")
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(SnapshotError::ToolFailed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(reported_snapshot_path(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn json_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[^\s`'"]+\.json"#).expect("static pattern"))
}

/// Last `.json` path mentioned in the tool's output that exists on disk
pub fn reported_snapshot_path(stdout: &str) -> Option<PathBuf> {
    json_path_pattern()
        .find_iter(stdout)
        .map(|m| PathBuf::from(m.as_str()))
        .filter(|p| p.is_file())
        .last()
}

fn list_files(dir: &Path) -> std::io::Result<BTreeSet<OsString>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name());
        }
    }
    Ok(names)
}

/// Run `tool` and rename its output to `<image_stem>.snapshot.json`.
///
/// The produced file is the tool-reported path when that lies inside the
/// snapshot directory, otherwise the lexicographically greatest name that
/// appeared between the two directory listings. Returns the new file name.
pub fn capture_snapshot(tool: &dyn SnapshotTool, image_stem: &str) -> Result<String, SnapshotError> {
    let dir = tool.snapshot_dir()?;
    let before = list_files(&dir)?;

    let reported = tool.save_snapshot()?;
    let produced = match reported.filter(|p| p.is_file() && is_within(&dir, p)) {
        Some(path) => path,
        None => {
            let after = list_files(&dir)?;
            let newest = after
                .difference(&before)
                .last()
                .ok_or_else(|| SnapshotError::NoNewSnapshot(dir.clone()))?;
            dir.join(newest)
        }
    };

    let name = format!("{}{}", image_stem, SNAPSHOT_SUFFIX);
    let target = ensure_within(&dir, &dir.join(&name))?;
    fs::rename(&produced, &target)?;

    tracing::info!(snapshot = %name, "environment snapshot saved");
    Ok(name)
}

/// [`capture_snapshot`], with every failure logged and swallowed
pub fn try_capture_snapshot(tool: &dyn SnapshotTool, image_stem: &str) -> Option<String> {
    match capture_snapshot(tool, image_stem) {
        Ok(name) => Some(name),
        Err(e) => {
            tracing::warn!(image = %image_stem, "snapshot skipped: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{SnapshotBehavior, StubSnapshotTool};
    use tempfile::TempDir;

    #[test]
    fn test_listing_diff_renames_new_file() {
        let dir = TempDir::new().unwrap();
        let snaps = dir.path().join("snapshots");
        fs::create_dir_all(&snaps).unwrap();
        fs::write(snaps.join("2024-01-01_old.json"), "{}").unwrap();

        let tool = StubSnapshotTool::new(
            &snaps,
            SnapshotBehavior::WriteSilently {
                name: "2024-06-01_12-00-00_snapshot.json".to_string(),
            },
        );
        let name = capture_snapshot(&tool, "FMJ_Versioned_00001_").unwrap();

        assert_eq!(name, "FMJ_Versioned_00001_.snapshot.json");
        assert!(snaps.join(&name).is_file());
        assert!(snaps.join("2024-01-01_old.json").is_file());
        assert!(!snaps.join("2024-06-01_12-00-00_snapshot.json").exists());
    }

    #[test]
    fn test_reported_path_preferred() {
        let dir = TempDir::new().unwrap();
        let tool = StubSnapshotTool::new(
            dir.path(),
            SnapshotBehavior::WriteAndReport {
                name: "reported.json".to_string(),
            },
        );
        let name = capture_snapshot(&tool, "img").unwrap();
        assert_eq!(name, "img.snapshot.json");
        assert!(!dir.path().join("reported.json").exists());
    }

    #[test]
    fn test_no_new_file() {
        let dir = TempDir::new().unwrap();
        let tool = StubSnapshotTool::new(dir.path(), SnapshotBehavior::NoOutput);
        let err = capture_snapshot(&tool, "img").unwrap_err();
        assert!(matches!(err, SnapshotError::NoNewSnapshot(_)));
    }

    #[test]
    fn test_failures_are_swallowed() {
        let dir = TempDir::new().unwrap();
        let tool = StubSnapshotTool::new(dir.path(), SnapshotBehavior::Fail);
        assert_eq!(try_capture_snapshot(&tool, "img"), None);
        assert_eq!(tool.invocations(), 1);
    }

    #[test]
    fn test_missing_manager_cli() {
        let dir = TempDir::new().unwrap();
        let config = ProvenanceConfig::default();
        let tool = ManagerSnapshotTool::from_config(&config, dir.path());
        assert!(matches!(
            tool.save_snapshot(),
            Err(SnapshotError::ToolMissing(_))
        ));
    }

    #[test]
    fn test_snapshot_dir_prefers_existing() {
        let dir = TempDir::new().unwrap();
        let config = ProvenanceConfig::default();
        let tool = ManagerSnapshotTool::from_config(&config, dir.path());

        // Neither exists: the last configured dir is created.
        let created = tool.snapshot_dir().unwrap();
        assert!(created.ends_with("user/__manager/snapshots"));

        let first = dir.path().join("user/default/ComfyUI-Manager/snapshots");
        fs::create_dir_all(&first).unwrap();
        assert_eq!(tool.snapshot_dir().unwrap(), first);
    }

    #[test]
    fn test_reported_path_parsing() {
        let dir = TempDir::new().unwrap();
        let snap = dir.path().join("2024-06-01_snapshot.json");
        fs::write(&snap, "{}").unwrap();

        let stdout = format!("Current snapshot is saved as `{}`\n", snap.display());
        assert_eq!(reported_snapshot_path(&stdout), Some(snap));
        assert_eq!(reported_snapshot_path("nothing here"), None);
        assert_eq!(reported_snapshot_path("saved as /no/such/file.json"), None);
    }
}
