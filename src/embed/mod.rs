//! Metadata embedding
//!
//! Writes a [`GenerationRecord`] into a PNG (one text chunk per field, the
//! extensions map as a single compact JSON chunk) or into a JSON sidecar.
//! Embedding never reads what is already at the target path.

pub mod png_chunks;
mod sidecar;
mod snapshot;

pub use png_chunks::{decode_png, read_text, DecodedPng, PngReadError, PngWriteError};
pub use sidecar::{to_sidecar_json, write_sidecar};
pub use snapshot::{
    capture_snapshot, reported_snapshot_path, try_capture_snapshot, ManagerSnapshotTool,
    SnapshotError, SnapshotTool, SNAPSHOT_SUFFIX,
};

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::record::{keys, GenerationRecord};

/// Errors from writing an artifact
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Png(#[from] PngWriteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 8-bit image data for one frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub samples: &'a [u8],
}

/// Where a record is embedded
#[derive(Debug, Clone, Copy)]
pub enum EmbedTarget<'a> {
    /// Encode `frame` as a PNG carrying the record in text chunks
    Image {
        path: &'a Path,
        frame: Frame<'a>,
        compress_level: u8,
    },
    /// Write a JSON sidecar document
    Sidecar { path: &'a Path },
}

/// Embed `record` into `target`, returning the written path
pub fn embed(target: EmbedTarget<'_>, record: &GenerationRecord) -> Result<PathBuf, EmbedError> {
    match target {
        EmbedTarget::Image {
            path,
            frame,
            compress_level,
        } => {
            png_chunks::write_png(
                path,
                frame.width,
                frame.height,
                frame.channels,
                frame.samples,
                &png_text_entries(record),
                compress_level,
            )?;
            tracing::debug!(path = %path.display(), "embedded provenance in PNG");
            Ok(path.to_path_buf())
        }
        EmbedTarget::Sidecar { path } => {
            write_sidecar(path, record)?;
            tracing::debug!(path = %path.display(), "wrote provenance sidecar");
            Ok(path.to_path_buf())
        }
    }
}

/// Compact JSON for a passthrough value
pub fn compact_json(value: &Value) -> String {
    // A Value always serializes; the string form is the fallback for text.
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// The ordered `(keyword, text)` pairs written into a PNG for `record`
///
/// Extra fields that would shadow a key owned by the embedder are dropped
/// with a warning.
pub fn png_text_entries(record: &GenerationRecord) -> Vec<(String, String)> {
    let mut entries = vec![
        (keys::PROMPT.to_string(), record.prompt_text.clone()),
        (keys::SEED.to_string(), record.seed.to_string()),
    ];

    if let Some(graph) = &record.prompt_graph {
        entries.push((keys::PROMPT_DICT.to_string(), compact_json(graph)));
    }

    for (key, value) in &record.extra_fields {
        if keys::is_reserved(key) {
            tracing::warn!(key = %key, "extra field collides with a provenance key, skipping");
            continue;
        }
        entries.push((key.clone(), compact_json(value)));
    }

    for (key, value) in record.fingerprint.scalar_fields() {
        entries.push((key.to_string(), value.to_string()));
    }
    entries.push((
        keys::EXTENSIONS.to_string(),
        record.fingerprint.extensions_json(),
    ));

    if let Some(reference) = &record.snapshot_reference {
        entries.push((keys::SNAPSHOT.to_string(), reference.clone()));
    }

    entries
}
