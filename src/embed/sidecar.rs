//! JSON sidecar documents
//!
//! The sidecar carries the same record as the PNG text chunks but nests the
//! fingerprint under `versions` and keeps the extensions map as a real object.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::fingerprint::VersionFingerprint;
use crate::record::{GenerationRecord, Seed};

#[derive(Serialize)]
struct SidecarDocument<'a> {
    prompt: &'a str,
    seed: &'a Seed,
    prompt_dict: Option<&'a Value>,
    extra_pnginfo: Option<&'a Map<String, Value>>,
    versions: &'a VersionFingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    fmj_snapshot: Option<&'a str>,
}

impl<'a> From<&'a GenerationRecord> for SidecarDocument<'a> {
    fn from(record: &'a GenerationRecord) -> Self {
        Self {
            prompt: &record.prompt_text,
            seed: &record.seed,
            prompt_dict: record.prompt_graph.as_ref(),
            extra_pnginfo: (!record.extra_fields.is_empty()).then_some(&record.extra_fields),
            versions: &record.fingerprint,
            fmj_snapshot: record.snapshot_reference.as_deref(),
        }
    }
}

/// Render the compact sidecar JSON for `record`
pub fn to_sidecar_json(record: &GenerationRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string(&SidecarDocument::from(record))
}

/// Write the sidecar document for `record` to `path`, replacing any file there
pub fn write_sidecar(path: &Path, record: &GenerationRecord) -> Result<(), super::EmbedError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &SidecarDocument::from(record))?;
    writer.flush()?;
    Ok(())
}
