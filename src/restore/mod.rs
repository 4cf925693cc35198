//! Restore-script synthesis
//!
//! Produces bash text that moves an install back to a saved fingerprint. The
//! script is only ever returned; nothing here runs it.
//!
//! Filesystem paths are interpolated verbatim inside double quotes. Values
//! read back from an artifact (version descriptors, the snapshot name) are
//! shell-quoted unless they consist of plain ref characters.

use std::path::{Path, PathBuf};

use crate::config::ProvenanceConfig;
use crate::fingerprint::VersionFingerprint;
use crate::reconcile::{HostComparison, ManagerComparison, NOT_INSTALLED};

/// Install layout the script refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSettings {
    /// Virtual environment directory, relative to the host root
    pub venv_dir: String,
    pub extensions_dir: String,
    pub manager_extension: String,
    pub manager_cli: String,
    pub python: String,
}

impl RestoreSettings {
    pub fn from_config(config: &ProvenanceConfig) -> Self {
        Self {
            venv_dir: config.host.venv_dir.clone(),
            extensions_dir: config.host.extensions_dir.clone(),
            manager_extension: config.manager.extension.clone(),
            manager_cli: config.manager.cli_script.clone(),
            python: config.host.python.clone(),
        }
    }

    fn manager_dir(&self, host_root: &Path) -> PathBuf {
        host_root
            .join(&self.extensions_dir)
            .join(&self.manager_extension)
    }
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self::from_config(&ProvenanceConfig::default())
    }
}

/// Quote `value` for the shell unless it is made of plain ref characters.
///
/// A leading `-` or `~` is always quoted.
pub fn shell_quote(value: &str) -> String {
    let bare = !value.is_empty()
        && !value.starts_with(['-', '~'])
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_.:/+=,@~^".contains(ch));
    if bare {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\"'\"'"))
    }
}

/// Artifact text on a single comment line
fn comment_text(value: &str) -> String {
    value.replace(|ch: char| ch.is_control(), " ")
}

/// `git checkout` of an artifact-supplied descriptor
fn checkout_line(descriptor: &str) -> String {
    // Quoting does not stop git from parsing a leading `-` as an option.
    if descriptor.starts_with('-') {
        format!("git checkout --end-of-options {}\n", shell_quote(descriptor))
    } else {
        format!("git checkout {}\n", shell_quote(descriptor))
    }
}

/// Build the restore script, or `None` when there is nothing to restore.
///
/// A script is produced when the host moved away from a resolvable saved
/// version, when the manager extension moved away from its saved version, or
/// when a snapshot reference is given.
pub fn synthesize(
    saved: &VersionFingerprint,
    current: &VersionFingerprint,
    snapshot_reference: Option<&str>,
    host_root: &Path,
    settings: &RestoreSettings,
) -> Option<String> {
    let host = HostComparison::compare(&saved.host_app_version, &current.host_app_version);
    let manager = ManagerComparison::compare(&settings.manager_extension, saved, current);
    let snapshot_reference = snapshot_reference.filter(|r| !r.is_empty());

    if !host.drifted() && !manager.drifted() && snapshot_reference.is_none() {
        return None;
    }

    let root = host_root.display();
    let venv = host_root.join(&settings.venv_dir).join("bin").join("activate");

    let mut script = String::new();
    script.push_str("#!/usr/bin/env bash\n");
    script.push_str("set -euo pipefail\n\n");
    script.push_str(&format!("if [ -f \"{}\" ]; then\n", venv.display()));
    script.push_str(&format!("    . \"{}\"\n", venv.display()));
    script.push_str("fi\n");

    if host.drifted() {
        script.push_str(&format!(
            "\n# ComfyUI: {} -> {}\n",
            comment_text(&host.current),
            comment_text(&host.saved)
        ));
        script.push_str(&format!("cd \"{}\"\n", root));
        script.push_str("git fetch --tags\n");
        script.push_str(&checkout_line(&host.saved));
        script.push_str("pip install -r requirements.txt\n");
    }

    if let Some(saved_manager) = manager.saved.as_ref().filter(|_| manager.drifted()) {
        let dir = settings.manager_dir(host_root);
        script.push_str(&format!(
            "\n# {}: {} -> {}\n",
            manager.name,
            comment_text(manager.current.as_deref().unwrap_or(NOT_INSTALLED)),
            comment_text(saved_manager)
        ));
        script.push_str(&format!("cd \"{}\"\n", dir.display()));
        script.push_str("git fetch --tags\n");
        script.push_str(&checkout_line(saved_manager));
        script.push_str("if [ -f requirements.txt ]; then pip install -r requirements.txt; fi\n");
        script.push_str(&format!(
            "if [ -f install.py ]; then {} install.py; fi\n",
            settings.python
        ));
    }

    if let Some(reference) = snapshot_reference {
        let cli = settings.manager_dir(host_root).join(&settings.manager_cli);
        script.push_str("\n# Restore extension revisions from the saved snapshot\n");
        script.push_str(&format!("cd \"{}\"\n", root));
        script.push_str(&format!(
            "{} \"{}\" restore-snapshot {}\n",
            settings.python,
            cli.display(),
            shell_quote(reference)
        ));
    }

    Some(script)
}
