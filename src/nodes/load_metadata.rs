//! Load Metadata

use std::fs;

use globset::GlobSet;

use crate::config::{ConfigError, ProvenanceConfig};
use crate::fingerprint::FingerprintCache;
use crate::host::HostPaths;
use crate::reader::{self, ReadError};
use crate::reconcile::{reconcile, render_report};
use crate::restore::{synthesize, RestoreSettings};

use super::NodeError;

/// Selection shown when the output directory has nothing loadable
pub const NO_FILES_PLACEHOLDER: &str = "No .json or .png files found";

/// Outputs of a metadata load
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataLoad {
    pub prompt_text: String,
    pub version_report: String,
    /// Empty when there is nothing to restore
    pub restore_script: String,
}

impl MetadataLoad {
    fn error(message: String) -> Self {
        Self {
            version_report: format!("[ERROR] {}", message),
            ..Self::default()
        }
    }
}

/// Reads provenance back from saved outputs and diffs it against this install
pub struct LoadMetadata<'a> {
    host: &'a dyn HostPaths,
    cache: &'a FingerprintCache,
    patterns: GlobSet,
    manager_extension: String,
    restore: RestoreSettings,
}

impl<'a> LoadMetadata<'a> {
    pub fn new(
        host: &'a dyn HostPaths,
        cache: &'a FingerprintCache,
        config: &ProvenanceConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host,
            cache,
            patterns: config.selectable_globs()?,
            manager_extension: config.manager.extension.clone(),
            restore: RestoreSettings::from_config(config),
        })
    }

    /// Loadable files in the output directory, sorted
    pub fn selectable_files(&self) -> Vec<String> {
        let output = self.host.output_directory();
        let mut files: Vec<String> = match fs::read_dir(&output) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| self.patterns.is_match(name))
                .collect(),
            Err(e) => {
                tracing::debug!(dir = %output.display(), "cannot list output directory: {}", e);
                Vec::new()
            }
        };

        if files.is_empty() {
            return vec![NO_FILES_PLACEHOLDER.to_string()];
        }
        files.sort();
        files
    }

    /// Read `file` from the output directory and report drift.
    ///
    /// Missing, unsupported or unreadable files come back as an `[ERROR]`
    /// report with an empty prompt. Only a path escaping the output
    /// directory is an `Err`.
    pub fn load_metadata(&self, file: &str) -> Result<MetadataLoad, NodeError> {
        let output = self.host.output_directory();
        let outcome = match reader::read(&output, &output.join(file)) {
            Ok(outcome) => outcome,
            Err(ReadError::SecurityViolation(e)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(file = %file, "cannot load metadata: {}", e);
                return Ok(MetadataLoad::error(e.to_string()));
            }
        };

        let saved = &outcome.record.fingerprint;
        let current = self.cache.get_or_collect();
        let result = reconcile(saved, current, &self.manager_extension);

        let restore_script = synthesize(
            saved,
            current,
            outcome.record.snapshot_reference.as_deref(),
            self.cache.root(),
            &self.restore,
        )
        .unwrap_or_default();

        Ok(MetadataLoad {
            prompt_text: outcome.record.prompt_text.clone(),
            version_report: render_report(&outcome.record, &result),
            restore_script,
        })
    }
}
