//! Provenance configuration
//!
//! Parses and validates `.fmj/provenance.toml`. Every key is optional; the
//! built-in defaults describe a stock host install.

mod defaults;

pub use defaults::{
    COMPRESS_LEVEL, EXTENSIONS_DIR, FILENAME_PREFIX, MANAGER_CLI, MANAGER_EXTENSION, MARKER_FILE,
    PLUGIN_DIR, SELECTABLE_PATTERNS, SNAPSHOT_DIRS, SNAPSHOT_PREFIX,
};

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Default config location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = ".fmj/provenance.toml";

/// Complete provenance configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    pub host: HostSection,
    pub manager: ManagerSection,
    pub save: SaveSection,
    pub runtime: RuntimeSection,
}

/// Host application layout and tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSection {
    /// Explicit host root; detected from `search_from` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Directory the upward root search starts from (default: executable dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_from: Option<PathBuf>,

    #[serde(default = "defaults::marker_file")]
    pub marker_file: String,

    #[serde(default = "defaults::extensions_dir")]
    pub extensions_dir: String,

    #[serde(default = "defaults::output_dir")]
    pub output_dir: String,

    #[serde(default = "defaults::input_dir")]
    pub input_dir: String,

    #[serde(default = "defaults::venv_dir")]
    pub venv_dir: String,

    #[serde(default = "defaults::python")]
    pub python: String,

    #[serde(default = "defaults::git")]
    pub git: String,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            root: None,
            search_from: None,
            marker_file: defaults::marker_file(),
            extensions_dir: defaults::extensions_dir(),
            output_dir: defaults::output_dir(),
            input_dir: defaults::input_dir(),
            venv_dir: defaults::venv_dir(),
            python: defaults::python(),
            git: defaults::git(),
        }
    }
}

/// Environment-manager extension settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSection {
    /// Extension directory name, compared by exact key during reconciliation
    #[serde(default = "defaults::manager_extension")]
    pub extension: String,

    #[serde(default = "defaults::manager_cli")]
    pub cli_script: String,

    /// Snapshot directories relative to the host root, first existing wins
    #[serde(default = "defaults::snapshot_dirs")]
    pub snapshot_dirs: Vec<String>,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            extension: defaults::manager_extension(),
            cli_script: defaults::manager_cli(),
            snapshot_dirs: defaults::snapshot_dirs(),
        }
    }
}

/// Save and load node settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSection {
    #[serde(default = "defaults::filename_prefix")]
    pub filename_prefix: String,

    #[serde(default = "defaults::snapshot_prefix")]
    pub snapshot_prefix: String,

    /// PNG compression level, 0 (fastest) to 9 (smallest)
    #[serde(default = "defaults::compress_level")]
    pub compress_level: u8,

    /// This plugin's directory name inside the extensions dir
    #[serde(default = "defaults::plugin_dir")]
    pub plugin_dir: String,

    /// Glob patterns for files the metadata loader lists
    #[serde(default = "defaults::selectable_patterns")]
    pub selectable_patterns: Vec<String>,
}

impl Default for SaveSection {
    fn default() -> Self {
        Self {
            filename_prefix: defaults::filename_prefix(),
            snapshot_prefix: defaults::snapshot_prefix(),
            compress_level: defaults::compress_level(),
            plugin_dir: defaults::plugin_dir(),
            selectable_patterns: defaults::selectable_patterns(),
        }
    }
}

/// Fixed runtime versions, bypassing the interpreter probe when all are set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_framework_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_version: Option<String>,
}

/// Errors that can occur when loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ProvenanceConfig {
    /// Load configuration from a specific path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ProvenanceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.save.compress_level > 9 {
            return Err(invalid(
                "save.compress_level",
                format!("{} is outside 0-9", self.save.compress_level),
            ));
        }

        let required = [
            ("host.marker_file", &self.host.marker_file),
            ("host.extensions_dir", &self.host.extensions_dir),
            ("host.python", &self.host.python),
            ("host.git", &self.host.git),
            ("manager.extension", &self.manager.extension),
            ("manager.cli_script", &self.manager.cli_script),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(field, "cannot be empty".to_string()));
            }
        }

        // Directory names are joined onto the host root and must stay single segments.
        for (field, value) in [
            ("host.extensions_dir", &self.host.extensions_dir),
            ("manager.extension", &self.manager.extension),
            ("save.plugin_dir", &self.save.plugin_dir),
        ] {
            if value.contains(['/', '\\']) || value == ".." {
                return Err(invalid(field, "must be a single directory name".to_string()));
            }
        }

        self.selectable_globs()?;
        Ok(())
    }

    /// Compile the loader's selectable-file patterns
    pub fn selectable_globs(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.save.selectable_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                invalid("save.selectable_patterns", format!("'{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| invalid("save.selectable_patterns", e.to_string()))
    }

    /// Resolve a configured directory against the host root
    pub fn resolve_dir(root: &Path, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

fn invalid(field: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProvenanceConfig::parse("").unwrap();
        assert_eq!(config, ProvenanceConfig::default());
        assert_eq!(config.host.marker_file, "folder_paths.py");
        assert_eq!(config.host.extensions_dir, "custom_nodes");
        assert_eq!(config.manager.extension, "ComfyUI-Manager");
        assert_eq!(config.save.compress_level, 4);
        assert_eq!(config.manager.snapshot_dirs.len(), 2);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
[host]
root = "/opt/comfy"
python = "/opt/comfy/venv/bin/python"

[save]
compress_level = 9

[runtime]
runtime_version = "3.11.9"
"#;
        let config = ProvenanceConfig::parse(toml).unwrap();
        assert_eq!(config.host.root, Some(PathBuf::from("/opt/comfy")));
        assert_eq!(config.host.python, "/opt/comfy/venv/bin/python");
        assert_eq!(config.host.git, "git");
        assert_eq!(config.save.compress_level, 9);
        assert_eq!(config.save.filename_prefix, "FMJ_Versioned");
        assert_eq!(config.runtime.runtime_version.as_deref(), Some("3.11.9"));
        assert!(config.runtime.accelerator_version.is_none());
    }

    #[test]
    fn test_compress_level_out_of_range() {
        let err = ProvenanceConfig::parse("[save]\ncompress_level = 12\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "save.compress_level"));
    }

    #[test]
    fn test_empty_manager_extension_rejected() {
        let err = ProvenanceConfig::parse("[manager]\nextension = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_nested_extensions_dir_rejected() {
        let err = ProvenanceConfig::parse("[host]\nextensions_dir = \"../nodes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "host.extensions_dir"));
    }

    #[test]
    fn test_bad_glob_rejected() {
        let err = ProvenanceConfig::parse("[save]\nselectable_patterns = [\"[\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_selectable_globs_match() {
        let config = ProvenanceConfig::default();
        let globs = config.selectable_globs().unwrap();
        assert!(globs.is_match("a.png"));
        assert!(globs.is_match("a.json"));
        assert!(!globs.is_match("a.snapshot.txt"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = ProvenanceConfig::parse("[host\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provenance.toml");
        assert!(matches!(
            ProvenanceConfig::load(&path),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(
            ProvenanceConfig::load_or_default(&path).unwrap(),
            ProvenanceConfig::default()
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provenance.toml");
        std::fs::write(&path, "[manager]\nextension = \"Manager\"\n").unwrap();
        let config = ProvenanceConfig::load(&path).unwrap();
        assert_eq!(config.manager.extension, "Manager");
    }

    #[test]
    fn test_resolve_dir() {
        let root = Path::new("/opt/comfy");
        assert_eq!(
            ProvenanceConfig::resolve_dir(root, "output"),
            PathBuf::from("/opt/comfy/output")
        );
        assert_eq!(
            ProvenanceConfig::resolve_dir(root, "/srv/images"),
            PathBuf::from("/srv/images")
        );
    }
}
