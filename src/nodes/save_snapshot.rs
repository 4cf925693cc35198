//! Save Image + Snapshot

use std::fs;
use std::path::Path;

use chrono::Local;
use fmj_guard::{content_hash, ensure_within, sanitize_filename};
use serde_json::{Map, Value};

use crate::config::ProvenanceConfig;
use crate::embed::{compact_json, png_chunks::write_png, EmbedError};
use crate::env_snapshot::EnvironmentSnapshot;
use crate::fingerprint::FingerprintCache;
use crate::host::HostPaths;
use crate::pixels::{PixelBatch, PixelError};
use crate::record::keys;

use super::{NodeError, UiImage};

/// Inputs of one snapshot save
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSaveOptions {
    pub positive: String,
    pub negative: String,
    pub filename_prefix: String,
    pub save_snapshot: bool,
    pub extra_fields: Map<String, Value>,
}

impl SnapshotSaveOptions {
    pub fn new(filename_prefix: impl Into<String>) -> Self {
        Self {
            positive: String::new(),
            negative: String::new(),
            filename_prefix: filename_prefix.into(),
            save_snapshot: true,
            extra_fields: Map::new(),
        }
    }
}

/// Saves images with their prompts and a plain-text environment snapshot
pub struct SaveImageWithSnapshot<'a> {
    host: &'a dyn HostPaths,
    cache: &'a FingerprintCache,
    default_prefix: String,
    compress_level: u8,
}

impl<'a> SaveImageWithSnapshot<'a> {
    pub fn new(
        host: &'a dyn HostPaths,
        cache: &'a FingerprintCache,
        default_prefix: impl Into<String>,
        compress_level: u8,
    ) -> Self {
        Self {
            host,
            cache,
            default_prefix: default_prefix.into(),
            compress_level,
        }
    }

    /// Fallback prefix and compression level from `[save]`
    pub fn from_config(
        host: &'a dyn HostPaths,
        cache: &'a FingerprintCache,
        config: &ProvenanceConfig,
    ) -> Self {
        Self::new(
            host,
            cache,
            config.save.snapshot_prefix.clone(),
            config.save.compress_level,
        )
    }

    /// Write `<prefix>_<YYYYmmdd_HHMMSS>_<idx:02>.png` per image, plus a
    /// `.snapshot.txt` copy when requested.
    pub fn save_images(
        &self,
        images: &PixelBatch,
        options: &SnapshotSaveOptions,
    ) -> Result<Vec<UiImage>, NodeError> {
        let output = self.host.output_directory();
        fs::create_dir_all(&output)?;

        let prefix = sanitize_filename(&options.filename_prefix, &self.default_prefix);
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let mut text: Vec<(String, String)> = options
            .extra_fields
            .iter()
            .map(|(k, v)| (k.clone(), compact_json(v)))
            .collect();
        text.push((keys::POSITIVE.to_string(), options.positive.clone()));
        text.push((keys::NEGATIVE.to_string(), options.negative.clone()));

        let mut results = Vec::with_capacity(images.len());
        for index in 0..images.len() {
            let stem = format!("{}_{}_{:02}", prefix, timestamp, index);
            let png_name = format!("{}.png", stem);
            let png_path = ensure_within(&output, &output.join(&png_name))?;

            let samples = images.frame_u8(index).ok_or(PixelError::EmptyImage)?;
            write_png(
                &png_path,
                images.width(),
                images.height(),
                images.channels(),
                &samples,
                &text,
                self.compress_level,
            )
            .map_err(EmbedError::from)?;

            if options.save_snapshot {
                self.copy_snapshot(&output, &stem)?;
            } else {
                tracing::debug!("environment snapshot disabled");
            }

            results.push(UiImage::output(png_name, ""));
        }

        Ok(results)
    }

    /// Refresh the root snapshot and copy it next to the image.
    ///
    /// Failing to write the snapshot only logs; a copy target outside the
    /// output directory is an error.
    fn copy_snapshot(&self, output: &Path, stem: &str) -> Result<(), NodeError> {
        let root = self.cache.root();
        let snapshot = EnvironmentSnapshot::from_cache(self.cache);
        let source = match snapshot.write(root) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("cannot write environment snapshot: {}", e);
                return Ok(());
            }
        };

        let target = ensure_within(output, &output.join(format!("{}.snapshot.txt", stem)))?;
        match fs::copy(&source, &target).and_then(|_| content_hash(&target)) {
            Ok(digest) => tracing::info!(file = %target.display(), sha256 = %digest, "snapshot copied"),
            Err(e) => tracing::warn!("cannot copy snapshot: {}", e),
        }
        Ok(())
    }
}
