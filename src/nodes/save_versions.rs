//! Save Image + Versions

use serde_json::{Map, Value};

use crate::embed::{embed, try_capture_snapshot, EmbedTarget, Frame, SnapshotTool};
use crate::fingerprint::FingerprintCache;
use crate::host::{HostError, HostPaths};
use crate::pixels::{PixelBatch, PixelError};
use crate::record::{GenerationRecord, Seed};

use super::{NodeError, UiImage};

/// Inputs of one save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    pub filename_prefix: String,
    /// Also write a `.json` sidecar next to each image
    pub save_sidecar: bool,
    pub prompt: String,
    pub seed: Seed,
    pub prompt_graph: Option<Value>,
    pub extra_fields: Map<String, Value>,
    /// Ask the environment manager for a snapshot per image
    pub create_snapshot: bool,
}

impl SaveOptions {
    pub fn new(filename_prefix: impl Into<String>) -> Self {
        Self {
            filename_prefix: filename_prefix.into(),
            save_sidecar: false,
            prompt: String::new(),
            seed: Seed::Number(0),
            prompt_graph: None,
            extra_fields: Map::new(),
            create_snapshot: false,
        }
    }
}

/// Saves images stamped with the cached version fingerprint
pub struct SaveImageVersions<'a> {
    host: &'a dyn HostPaths,
    cache: &'a FingerprintCache,
    snapshot_tool: Option<&'a dyn SnapshotTool>,
    compress_level: u8,
}

impl<'a> SaveImageVersions<'a> {
    pub fn new(host: &'a dyn HostPaths, cache: &'a FingerprintCache, compress_level: u8) -> Self {
        Self {
            host,
            cache,
            snapshot_tool: None,
            compress_level,
        }
    }

    pub fn with_snapshot_tool(mut self, tool: &'a dyn SnapshotTool) -> Self {
        self.snapshot_tool = Some(tool);
        self
    }

    /// Write every image in `images` and report what was written.
    ///
    /// Files are named `<stem>_<counter:05>_.png`, `%batch_num%` in the stem
    /// replaced by the batch index, the counter advancing per image.
    pub fn save_images(
        &self,
        images: &PixelBatch,
        options: &SaveOptions,
    ) -> Result<Vec<UiImage>, NodeError> {
        let save = self
            .host
            .save_image_path(&options.filename_prefix, images.width(), images.height())?;
        let fingerprint = self.cache.get_or_collect();

        let mut results = Vec::with_capacity(images.len());

        for index in 0..images.len() {
            let samples = images.frame_u8(index).ok_or(PixelError::EmptyImage)?;
            let counter = save
                .counter
                .checked_add(index as u64)
                .ok_or_else(|| HostError::CounterExhausted(save.filename.clone()))?;

            let stem = format!(
                "{}_{:05}_",
                save.filename.replace("%batch_num%", &index.to_string()),
                counter
            );
            let file = format!("{}.png", stem);

            let snapshot_reference = match (options.create_snapshot, self.snapshot_tool) {
                (true, Some(tool)) => try_capture_snapshot(tool, &stem),
                (true, None) => {
                    tracing::warn!("snapshot requested but no snapshot tool is configured");
                    None
                }
                (false, _) => None,
            };

            let record = GenerationRecord::new(fingerprint.clone())
                .with_prompt(options.prompt.clone())
                .with_seed(options.seed.clone())
                .with_prompt_graph(options.prompt_graph.clone())
                .with_extra_fields(options.extra_fields.clone())
                .with_snapshot_reference(snapshot_reference);

            let png_path = fmj_guard::ensure_within(&save.folder, &save.folder.join(&file))?;
            embed(
                EmbedTarget::Image {
                    path: &png_path,
                    frame: Frame {
                        width: images.width(),
                        height: images.height(),
                        channels: images.channels(),
                        samples: &samples,
                    },
                    compress_level: self.compress_level,
                },
                &record,
            )?;

            if options.save_sidecar {
                let json_path = fmj_guard::ensure_within(
                    &save.folder,
                    &save.folder.join(format!("{}.json", stem)),
                )?;
                embed(EmbedTarget::Sidecar { path: &json_path }, &record)?;
            }

            tracing::info!(file = %file, "saved image with provenance");
            results.push(UiImage::output(file, save.subfolder.clone()));
        }

        Ok(results)
    }
}
