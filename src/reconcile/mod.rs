//! Saved vs. current fingerprint comparison
//!
//! The saved fingerprint is the reference list: every saved extension gets a
//! [`DiffEntry`], extensions installed since are only reported by
//! [`reconcile_symmetric`]. Extension names are matched after
//! [`normalize_name`], so `My-Node` and `my_node` are the same component.

mod report;

pub use report::render_report;

use std::fmt;

use serde::Serialize;

use crate::fingerprint::{VersionFingerprint, UNKNOWN_HOST_VERSION};

/// Placeholder for a component absent on one side of a diff
pub const NOT_INSTALLED: &str = "NOT INSTALLED";

/// Lowercase, with `-` and spaces mapped to `_`
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Classification of one extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffStatus {
    Match,
    Changed,
    MissingNow,
    NewlyInstalled,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiffStatus::Match => "MATCH",
            DiffStatus::Changed => "CHANGED",
            DiffStatus::MissingNow => "MISSING_NOW",
            DiffStatus::NewlyInstalled => "NEWLY_INSTALLED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub component_name: String,
    pub saved_value: String,
    pub current_value: String,
    pub status: DiffStatus,
}

/// Outcome of the host application version comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    Match,
    Changed,
    /// Saved version was never resolved; the difference is not a warning
    UnknownSaved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostComparison {
    pub saved: String,
    pub current: String,
    pub status: HostStatus,
}

impl HostComparison {
    pub fn compare(saved: &str, current: &str) -> Self {
        let status = if saved == current {
            HostStatus::Match
        } else if saved == UNKNOWN_HOST_VERSION {
            HostStatus::UnknownSaved
        } else {
            HostStatus::Changed
        };
        Self {
            saved: saved.to_string(),
            current: current.to_string(),
            status,
        }
    }

    /// Host moved away from a resolvable saved version
    pub fn drifted(&self) -> bool {
        self.status == HostStatus::Changed
    }
}

/// The environment-manager extension, looked up by exact key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerComparison {
    pub name: String,
    pub saved: Option<String>,
    pub current: Option<String>,
}

impl ManagerComparison {
    pub fn compare(name: &str, saved: &VersionFingerprint, current: &VersionFingerprint) -> Self {
        Self {
            name: name.to_string(),
            saved: saved.extensions.get(name).cloned(),
            current: current.extensions.get(name).cloned(),
        }
    }

    /// Manager was installed at save time and is now at another version or gone
    pub fn drifted(&self) -> bool {
        match &self.saved {
            Some(saved) => self.current.as_ref() != Some(saved),
            None => false,
        }
    }
}

/// Full comparison of a saved fingerprint against the live one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub entries: Vec<DiffEntry>,
    pub host: HostComparison,
    pub manager: ManagerComparison,
}

impl Reconciliation {
    /// Every extension matches and the host did not drift
    pub fn is_clean(&self) -> bool {
        self.host.status != HostStatus::Changed
            && self.entries.iter().all(|e| e.status == DiffStatus::Match)
    }

    pub fn count(&self, status: DiffStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

/// First current extension whose normalized name matches `normalized`
fn find_current<'a>(
    current: &'a VersionFingerprint,
    normalized: &str,
) -> Option<(&'a String, &'a String)> {
    current
        .extensions
        .iter()
        .find(|(name, _)| normalize_name(name) == normalized)
}

/// Compare `saved` against `current`; only saved extensions are listed.
pub fn reconcile(
    saved: &VersionFingerprint,
    current: &VersionFingerprint,
    manager_extension: &str,
) -> Reconciliation {
    let entries = saved
        .extensions
        .iter()
        .map(|(name, saved_value)| match find_current(current, &normalize_name(name)) {
            Some((_, current_value)) => DiffEntry {
                component_name: name.clone(),
                saved_value: saved_value.clone(),
                current_value: current_value.clone(),
                status: if current_value == saved_value {
                    DiffStatus::Match
                } else {
                    DiffStatus::Changed
                },
            },
            None => DiffEntry {
                component_name: name.clone(),
                saved_value: saved_value.clone(),
                current_value: NOT_INSTALLED.to_string(),
                status: DiffStatus::MissingNow,
            },
        })
        .collect();

    Reconciliation {
        entries,
        host: HostComparison::compare(&saved.host_app_version, &current.host_app_version),
        manager: ManagerComparison::compare(manager_extension, saved, current),
    }
}

/// [`reconcile`], followed by `NEWLY_INSTALLED` entries for current
/// extensions no saved extension matched.
pub fn reconcile_symmetric(
    saved: &VersionFingerprint,
    current: &VersionFingerprint,
    manager_extension: &str,
) -> Reconciliation {
    let mut result = reconcile(saved, current, manager_extension);

    let saved_names: Vec<String> = saved.extensions.keys().map(|n| normalize_name(n)).collect();
    for (name, current_value) in &current.extensions {
        if saved_names.contains(&normalize_name(name)) {
            continue;
        }
        result.entries.push(DiffEntry {
            component_name: name.clone(),
            saved_value: NOT_INSTALLED.to_string(),
            current_value: current_value.clone(),
            status: DiffStatus::NewlyInstalled,
        });
    }

    result
}
