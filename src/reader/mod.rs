//! Metadata reading
//!
//! Inverse of [`crate::embed`]: rebuilds a [`GenerationRecord`] from a PNG's
//! text chunks or from a JSON sidecar. Reading is lenient. Absent fields take
//! their defaults and malformed embedded JSON degrades to an empty value,
//! while [`RawVersionFields`] keeps what was actually found.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use fmj_guard::{ensure_within, GuardError};
use serde_json::{Map, Value};

use crate::embed::read_text;
use crate::fingerprint::{extensions_from_value, VersionFingerprint, UNKNOWN, UNKNOWN_HOST_VERSION};
use crate::record::{keys, GenerationRecord, Seed};

/// Errors from reading an artifact
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported file type: {0}. Use .json or .png")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    SecurityViolation(#[from] GuardError),

    #[error("Failed to read file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Artifact forms the reader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Png,
    Sidecar,
}

impl ArtifactFormat {
    /// Detect the form from the file extension (`.png` or `.json`)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("png") {
            Some(Self::Png)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Sidecar)
        } else {
            None
        }
    }
}

/// State of the embedded extensions map
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExtensionsField {
    #[default]
    Absent,
    Parsed(BTreeMap<String, String>),
    /// Present but not a JSON object; holds the raw text
    Malformed(String),
}

/// Fingerprint fields exactly as found in the artifact
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawVersionFields {
    pub host_app_version: Option<String>,
    pub runtime_version: Option<String>,
    pub numeric_framework_version: Option<String>,
    pub accelerator_version: Option<String>,
    pub extensions: ExtensionsField,
}

impl RawVersionFields {
    /// Fingerprint with every missing field defaulted
    pub fn to_fingerprint(&self) -> VersionFingerprint {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        VersionFingerprint {
            host_app_version: self
                .host_app_version
                .clone()
                .unwrap_or_else(|| UNKNOWN_HOST_VERSION.to_string()),
            runtime_version: or_unknown(&self.runtime_version),
            numeric_framework_version: or_unknown(&self.numeric_framework_version),
            accelerator_version: or_unknown(&self.accelerator_version),
            extensions: match &self.extensions {
                ExtensionsField::Parsed(map) => map.clone(),
                ExtensionsField::Absent | ExtensionsField::Malformed(_) => BTreeMap::new(),
            },
        }
    }

    /// True when the artifact carried no fingerprint fields at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of reading an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub format: ArtifactFormat,
    pub record: GenerationRecord,
    pub raw: RawVersionFields,
}

/// Read the artifact at `path`, which must resolve inside `base`
pub fn read(base: &Path, path: &Path) -> Result<ReadOutcome, ReadError> {
    if !base.is_dir() {
        return Err(ReadError::NotFound(path.to_path_buf()));
    }
    let path = ensure_within(base, path)?;
    if !path.is_file() {
        return Err(ReadError::NotFound(path));
    }
    let format =
        ArtifactFormat::from_path(&path).ok_or_else(|| ReadError::UnsupportedFormat(path.clone()))?;

    let (record, raw) = match format {
        ArtifactFormat::Png => {
            let text = read_text(&path).map_err(|e| corrupt(&path, e))?;
            from_png_text(&text)
        }
        ArtifactFormat::Sidecar => {
            let content = fs::read_to_string(&path).map_err(|e| corrupt(&path, e))?;
            let doc: Value = serde_json::from_str(&content).map_err(|e| corrupt(&path, e))?;
            from_sidecar(&doc)
        }
    };

    tracing::debug!(path = %path.display(), ?format, "read provenance");
    Ok(ReadOutcome {
        format,
        record,
        raw,
    })
}

fn corrupt(path: &Path, err: impl std::fmt::Display) -> ReadError {
    ReadError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn parse_extensions_text(text: &str) -> ExtensionsField {
    match extensions_from_value(&Value::String(text.to_string())) {
        Some(map) => ExtensionsField::Parsed(map),
        None => {
            tracing::warn!("embedded extensions value is not a JSON object, treating as empty");
            ExtensionsField::Malformed(text.to_string())
        }
    }
}

/// Parse a text value as JSON, keeping it as a string when it is not JSON
fn json_or_string(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Rebuild a record from PNG text chunks
pub fn from_png_text(text: &BTreeMap<String, String>) -> (GenerationRecord, RawVersionFields) {
    let raw = RawVersionFields {
        host_app_version: text.get(keys::HOST_VERSION).cloned(),
        runtime_version: text.get(keys::RUNTIME_VERSION).cloned(),
        numeric_framework_version: text.get(keys::FRAMEWORK_VERSION).cloned(),
        accelerator_version: text.get(keys::ACCELERATOR_VERSION).cloned(),
        extensions: text
            .get(keys::EXTENSIONS)
            .map(|t| parse_extensions_text(t))
            .unwrap_or_default(),
    };

    let extra_fields: Map<String, Value> = text
        .iter()
        .filter(|(key, _)| !keys::is_reserved(key))
        .map(|(key, value)| (key.clone(), json_or_string(value)))
        .collect();

    let record = GenerationRecord::new(raw.to_fingerprint())
        .with_prompt(text.get(keys::PROMPT).cloned().unwrap_or_default())
        .with_seed(
            text.get(keys::SEED)
                .map(|s| Seed::from_display(s))
                .unwrap_or_default(),
        )
        .with_prompt_graph(text.get(keys::PROMPT_DICT).map(|t| json_or_string(t)))
        .with_extra_fields(extra_fields)
        .with_snapshot_reference(text.get(keys::SNAPSHOT).cloned());

    (record, raw)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Rebuild a record from a sidecar document
pub fn from_sidecar(doc: &Value) -> (GenerationRecord, RawVersionFields) {
    let versions = doc.get(keys::VERSIONS).filter(|v| v.is_object());
    let field = |key: &str| versions.and_then(|v| v.get(key)).and_then(scalar_text);

    let extensions = match versions.and_then(|v| v.get(keys::EXTENSIONS)) {
        None | Some(Value::Null) => ExtensionsField::Absent,
        Some(value) => match extensions_from_value(value) {
            Some(map) => ExtensionsField::Parsed(map),
            None => {
                tracing::warn!("sidecar extensions value is not an object, treating as empty");
                ExtensionsField::Malformed(value.to_string())
            }
        },
    };

    let raw = RawVersionFields {
        host_app_version: field(keys::HOST_VERSION),
        runtime_version: field(keys::RUNTIME_VERSION),
        numeric_framework_version: field(keys::FRAMEWORK_VERSION),
        accelerator_version: field(keys::ACCELERATOR_VERSION),
        extensions,
    };

    let extra_fields = doc
        .get(keys::EXTRA_PNGINFO)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let record = GenerationRecord::new(raw.to_fingerprint())
        .with_prompt(doc.get(keys::PROMPT).and_then(scalar_text).unwrap_or_default())
        .with_seed(doc.get(keys::SEED).map(Seed::from_json).unwrap_or_default())
        .with_prompt_graph(doc.get(keys::PROMPT_DICT).filter(|v| !v.is_null()).cloned())
        .with_extra_fields(extra_fields)
        .with_snapshot_reference(doc.get(keys::SNAPSHOT).and_then(scalar_text));

    (record, raw)
}
