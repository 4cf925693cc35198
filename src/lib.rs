//! FMJ Provenance - version stamping for generated images
//!
//! This crate records which host application, runtime and extension
//! revisions produced an image, embeds that fingerprint into the PNG (and an
//! optional JSON sidecar), reads it back later, reports drift against the
//! current install and synthesizes a shell script that rolls the install
//! back.

pub mod config;
pub mod embed;
pub mod env_snapshot;
pub mod fingerprint;
pub mod host;
pub mod mock;
pub mod nodes;
pub mod pixels;
pub mod reader;
pub mod reconcile;
pub mod record;
pub mod restore;

pub use config::{ConfigError, ProvenanceConfig};
pub use fingerprint::{FingerprintCache, VersionFingerprint};
pub use reader::{read, ReadError, ReadOutcome};
pub use reconcile::{reconcile, Reconciliation};
pub use record::{GenerationRecord, Seed};
pub use restore::synthesize;
