//! Path and content guard for provenance artifacts.
//!
//! Every path the save and load nodes derive from user input (filename
//! prefixes, selections from a file list) is confined to a base directory
//! through [`ensure_within`] before any byte is read or written.

mod confine;
mod digest;
mod filename;

pub use confine::{ensure_within, is_within, resolve_lenient};
pub use digest::{content_hash, CHUNK_SIZE};
pub use filename::{sanitize_filename, MAX_FILENAME_LEN};

use std::path::PathBuf;

/// Errors raised by guard checks.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The resolved path escapes the expected base directory.
    #[error("Security check failed: {path} is outside {base}")]
    SecurityViolation { base: PathBuf, path: PathBuf },
}
