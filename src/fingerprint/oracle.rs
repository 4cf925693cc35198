//! Version-control queries
//!
//! All repository lookups go through [`VersionOracle`] so collection can be
//! exercised without a real `git` on the path.

use std::path::Path;
use std::process::{Command, Stdio};

/// Answers revision questions about a directory.
///
/// Every method returns `None` on any failure: missing tool, non-zero exit,
/// not a repository, or empty output.
pub trait VersionOracle: Send + Sync {
    /// Tag-or-commit descriptor (`git describe --tags --always`)
    fn describe(&self, path: &Path) -> Option<String>;

    /// Full commit id of HEAD
    fn head_commit(&self, path: &Path) -> Option<String>;

    /// URL of the `origin` remote
    fn remote_url(&self, path: &Path) -> Option<String>;
}

/// True if `path` carries a version-control marker (`.git` dir or file)
pub fn has_version_control(path: &Path) -> bool {
    path.join(".git").exists()
}

/// [`VersionOracle`] backed by the `git` command line
#[derive(Debug, Clone)]
pub struct GitOracle {
    binary: String,
}

impl GitOracle {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, path: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("-C")
            .arg(path)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if stdout.is_empty() {
                    None
                } else {
                    Some(stdout)
                }
            }
            Ok(output) => {
                tracing::debug!(
                    path = %path.display(),
                    status = ?output.status.code(),
                    "git {} failed",
                    args.join(" ")
                );
                None
            }
            Err(e) => {
                tracing::debug!(binary = %self.binary, "git unavailable: {}", e);
                None
            }
        }
    }
}

impl Default for GitOracle {
    fn default() -> Self {
        Self::new("git")
    }
}

impl VersionOracle for GitOracle {
    fn describe(&self, path: &Path) -> Option<String> {
        self.run(path, &["describe", "--tags", "--always"])
    }

    fn head_commit(&self, path: &Path) -> Option<String> {
        self.run(path, &["rev-parse", "HEAD"])
    }

    fn remote_url(&self, path: &Path) -> Option<String> {
        self.run(path, &["remote", "get-url", "origin"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_binary_yields_none() {
        let dir = TempDir::new().unwrap();
        let oracle = GitOracle::new("definitely-not-a-vcs-binary-7f3a");
        assert!(oracle.describe(dir.path()).is_none());
        assert!(oracle.head_commit(dir.path()).is_none());
        assert!(oracle.remote_url(dir.path()).is_none());
    }

    #[test]
    fn test_non_repository_yields_none() {
        // Holds whether or not git is installed: either the tool is missing
        // or the directory is not a repository.
        let dir = TempDir::new().unwrap();
        let oracle = GitOracle::default();
        assert!(oracle.head_commit(dir.path()).is_none());
    }

    #[test]
    fn test_has_version_control() {
        let dir = TempDir::new().unwrap();
        assert!(!has_version_control(dir.path()));
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(has_version_control(dir.path()));
    }

    #[test]
    fn test_git_file_marker_counts() {
        // Worktrees and submodules use a `.git` file instead of a directory.
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".git"), "gitdir: ../.git/worktrees/x").unwrap();
        assert!(has_version_control(dir.path()));
    }
}
