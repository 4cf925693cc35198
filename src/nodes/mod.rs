//! Node-style entry points
//!
//! Each node bundles the host collaborators it needs and exposes one
//! operation with the host's input and output shape.

mod load_metadata;
mod load_snapshot;
mod save_snapshot;
mod save_versions;

pub use load_metadata::{LoadMetadata, MetadataLoad, NO_FILES_PLACEHOLDER};
pub use load_snapshot::{restore_command, LoadImageWithSnapshot, SnapshotLoad};
pub use save_snapshot::{SaveImageWithSnapshot, SnapshotSaveOptions};
pub use save_versions::{SaveImageVersions, SaveOptions};

use serde::{Deserialize, Serialize};

use fmj_guard::GuardError;

use crate::embed::{EmbedError, PngReadError};
use crate::host::HostError;
use crate::pixels::PixelError;

/// Errors surfaced by node operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Pixels(#[from] PixelError),

    #[error("Failed to decode image: {0}")]
    Decode(#[from] PngReadError),

    #[error("Invalid image selection: {0}")]
    InvalidSelection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image entry reported back to the host UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiImage {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl UiImage {
    pub fn output(filename: impl Into<String>, subfolder: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: subfolder.into(),
            kind: "output".to_string(),
        }
    }
}
