//! Version fingerprint collection
//!
//! A fingerprint records the runtime, tensor framework, accelerator, host
//! application and per-extension versions active in this process. Collection
//! never fails: every unresolvable value degrades to a sentinel or is omitted,
//! so a save never aborts because provenance was incomplete.

mod oracle;
mod runtime;

pub use oracle::{has_version_control, GitOracle, VersionOracle};
pub use runtime::{
    parse_probe_output, PythonRuntimeProbe, RuntimeProbe, RuntimeVersions, StaticRuntimeProbe,
    NO_DEVICE,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::config::{HostSection, ProvenanceConfig, RuntimeSection};
use crate::record::keys;

/// Host version when the install root is not a resolvable repository
pub const UNKNOWN_HOST_VERSION: &str = "Unknown";

/// Accelerator version when no accelerator is available
pub const NO_ACCELERATOR: &str = "CPU";

/// Any other value that could not be determined
pub const UNKNOWN: &str = "unknown";

/// Environment fingerprint captured at save time
///
/// `extensions` keys are the literal on-disk directory names. They are never
/// normalized here; matching tolerance belongs to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFingerprint {
    #[serde(rename = "ComfyUI_Version", default = "unknown_host")]
    pub host_app_version: String,

    #[serde(rename = "Python_Version", default = "unknown")]
    pub runtime_version: String,

    #[serde(rename = "PyTorch_Version", default = "unknown")]
    pub numeric_framework_version: String,

    #[serde(rename = "CUDA_Version", default = "unknown")]
    pub accelerator_version: String,

    #[serde(rename = "Custom_Nodes_Versions", default)]
    pub extensions: BTreeMap<String, String>,
}

fn unknown_host() -> String {
    UNKNOWN_HOST_VERSION.to_string()
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

impl Default for VersionFingerprint {
    fn default() -> Self {
        Self {
            host_app_version: unknown_host(),
            runtime_version: unknown(),
            numeric_framework_version: unknown(),
            accelerator_version: unknown(),
            extensions: BTreeMap::new(),
        }
    }
}

impl VersionFingerprint {
    /// Scalar fields as `(wire key, value)` pairs, in embedding order
    pub fn scalar_fields(&self) -> [(&'static str, &str); 4] {
        [
            (keys::RUNTIME_VERSION, self.runtime_version.as_str()),
            (keys::FRAMEWORK_VERSION, self.numeric_framework_version.as_str()),
            (keys::ACCELERATOR_VERSION, self.accelerator_version.as_str()),
            (keys::HOST_VERSION, self.host_app_version.as_str()),
        ]
    }

    /// Compact JSON text of the extensions map (`{"a":"v1","b":"v2"}`)
    pub fn extensions_json(&self) -> String {
        // A map of strings always serializes.
        serde_json::to_string(&self.extensions).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Convert a structured extensions value into a name -> descriptor map.
///
/// Objects are taken as-is (non-string values are stringified), strings are
/// parsed as embedded JSON. Anything else, including malformed JSON text,
/// yields `None`.
pub fn extensions_from_value(value: &Value) -> Option<BTreeMap<String, String>> {
    match value {
        Value::Object(map) => Some(
            map.iter()
                .map(|(name, version)| {
                    let version = match version {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (name.clone(), version)
                })
                .collect(),
        ),
        Value::String(text) => serde_json::from_str::<Value>(text)
            .ok()
            .filter(Value::is_object)
            .and_then(|parsed| extensions_from_value(&parsed)),
        _ => None,
    }
}

/// Immediate subdirectories of `extensions_root`, sorted by name.
///
/// Symlinked extension directories are followed. A missing directory yields
/// an empty list.
pub fn extension_dirs(extensions_root: &Path) -> Vec<(String, PathBuf)> {
    if !extensions_root.is_dir() {
        return Vec::new();
    }

    WalkDir::new(extensions_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("skipping unreadable extension entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.path().is_dir())
        .map(|entry| {
            (
                entry.file_name().to_string_lossy().into_owned(),
                entry.path().to_path_buf(),
            )
        })
        .collect()
}

/// Collect a fresh fingerprint for the host installed at `root`
pub fn collect_fingerprint(
    root: &Path,
    extensions_dir: &str,
    oracle: &dyn VersionOracle,
    runtime: &dyn RuntimeProbe,
) -> VersionFingerprint {
    let versions = runtime.probe();

    let host_app_version = oracle.describe(root).unwrap_or_else(|| {
        tracing::warn!(root = %root.display(), "host version unresolvable, recording Unknown");
        unknown_host()
    });

    let mut extensions = BTreeMap::new();
    for (name, path) in extension_dirs(&root.join(extensions_dir)) {
        if !has_version_control(&path) {
            continue;
        }
        match oracle.describe(&path) {
            Some(descriptor) => {
                extensions.insert(name, descriptor);
            }
            None => tracing::debug!(extension = %name, "describe failed, omitting"),
        }
    }

    tracing::debug!(
        host = %host_app_version,
        extensions = extensions.len(),
        "collected version fingerprint"
    );

    VersionFingerprint {
        host_app_version,
        runtime_version: versions.runtime,
        numeric_framework_version: versions.numeric_framework,
        accelerator_version: versions.accelerator,
        extensions,
    }
}

/// Walk upward from `start` to the first directory containing `marker`
pub fn detect_host_root(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).exists())
        .map(Path::to_path_buf)
}

/// Host root from configuration, detection, or the entry point's directory
pub fn resolve_host_root(host: &HostSection) -> PathBuf {
    if let Some(ref root) = host.root {
        return root.clone();
    }

    let entry_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let start = host.search_from.clone().unwrap_or_else(|| entry_dir.clone());
    detect_host_root(&start, &host.marker_file).unwrap_or(entry_dir)
}

/// Runtime probe honoring configured overrides
pub fn runtime_probe_from_config(config: &ProvenanceConfig) -> Box<dyn RuntimeProbe> {
    let overrides = &config.runtime;
    let python = PythonRuntimeProbe::new(config.host.python.clone());

    match (
        &overrides.runtime_version,
        &overrides.numeric_framework_version,
        &overrides.accelerator_version,
    ) {
        (Some(runtime), Some(framework), Some(accelerator)) => {
            Box::new(StaticRuntimeProbe::new(RuntimeVersions {
                runtime: runtime.clone(),
                numeric_framework: framework.clone(),
                accelerator: accelerator.clone(),
                device: NO_DEVICE.to_string(),
            }))
        }
        (None, None, None) => Box::new(python),
        _ => Box::new(OverridingProbe {
            inner: python,
            overrides: overrides.clone(),
        }),
    }
}

/// Probe whose individual values may be pinned by configuration
struct OverridingProbe {
    inner: PythonRuntimeProbe,
    overrides: RuntimeSection,
}

impl RuntimeProbe for OverridingProbe {
    fn probe(&self) -> RuntimeVersions {
        let mut versions = self.inner.probe();
        if let Some(ref v) = self.overrides.runtime_version {
            versions.runtime = v.clone();
        }
        if let Some(ref v) = self.overrides.numeric_framework_version {
            versions.numeric_framework = v.clone();
        }
        if let Some(ref v) = self.overrides.accelerator_version {
            versions.accelerator = v.clone();
        }
        versions
    }
}

/// Process-lifetime fingerprint cache
///
/// Construct once per process and pass by reference. The first
/// [`get_or_collect`](Self::get_or_collect) runs every subprocess; later calls
/// return the stored value even if the environment has since changed.
pub struct FingerprintCache {
    root: PathBuf,
    extensions_dir: String,
    oracle: Box<dyn VersionOracle>,
    runtime: Box<dyn RuntimeProbe>,
    cached: OnceLock<VersionFingerprint>,
}

impl FingerprintCache {
    pub fn new(
        root: PathBuf,
        extensions_dir: impl Into<String>,
        oracle: Box<dyn VersionOracle>,
        runtime: Box<dyn RuntimeProbe>,
    ) -> Self {
        Self {
            root,
            extensions_dir: extensions_dir.into(),
            oracle,
            runtime,
            cached: OnceLock::new(),
        }
    }

    /// Cache over `git` and the configured interpreter
    pub fn from_config(config: &ProvenanceConfig, root: PathBuf) -> Self {
        Self::new(
            root,
            config.host.extensions_dir.clone(),
            Box::new(GitOracle::new(config.host.git.clone())),
            runtime_probe_from_config(config),
        )
    }

    /// Host install root this cache fingerprints
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding installed extensions
    pub fn extensions_root(&self) -> PathBuf {
        self.root.join(&self.extensions_dir)
    }

    pub fn oracle(&self) -> &dyn VersionOracle {
        self.oracle.as_ref()
    }

    pub fn runtime(&self) -> &dyn RuntimeProbe {
        self.runtime.as_ref()
    }

    /// The cached fingerprint, collecting it on first use
    pub fn get_or_collect(&self) -> &VersionFingerprint {
        self.cached.get_or_init(|| self.collect())
    }

    /// Collect a fresh fingerprint without touching the cache
    pub fn collect(&self) -> VersionFingerprint {
        collect_fingerprint(
            &self.root,
            &self.extensions_dir,
            self.oracle.as_ref(),
            self.runtime.as_ref(),
        )
    }

    /// Whether a fingerprint has been stored
    pub fn is_cached(&self) -> bool {
        self.cached.get().is_some()
    }
}

impl std::fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("root", &self.root)
            .field("extensions_dir", &self.extensions_dir)
            .field("cached", &self.cached.get().is_some())
            .finish()
    }
}
