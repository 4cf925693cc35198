//! Host application collaborators
//!
//! The host owns its output/input directories, the filename counter used for
//! saves and the resolution of user-facing file selections. [`HostPaths`] is
//! that contract; [`LocalHost`] implements it over a plain directory layout
//! with the host's own numbering scheme.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fmj_guard::{ensure_within, GuardError};

use crate::config::ProvenanceConfig;

/// Where the next save for a prefix goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePath {
    /// Absolute folder the files are written into
    pub folder: PathBuf,
    /// Filename stem, may still contain `%batch_num%`
    pub filename: String,
    /// First free counter value for this stem
    pub counter: u64,
    /// Folder relative to the output directory (`""` for the root)
    pub subfolder: String,
}

/// Errors from host path allocation
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("filename counter exhausted for '{0}'")]
    CounterExhausted(String),
}

/// Directory and filename services provided by the host application
pub trait HostPaths {
    fn output_directory(&self) -> PathBuf;

    fn input_directory(&self) -> PathBuf;

    /// Allocate a non-colliding stem and counter for `prefix`
    fn save_image_path(&self, prefix: &str, width: u32, height: u32)
        -> Result<SavePath, HostError>;

    /// Resolve a selection such as `"a.png"` or `"a.png [output]"`
    fn annotated_filepath(&self, name: &str) -> PathBuf;
}

/// [`HostPaths`] over directories on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalHost {
    root: PathBuf,
    output: PathBuf,
    input: PathBuf,
}

impl LocalHost {
    pub fn new(root: PathBuf, output: PathBuf, input: PathBuf) -> Self {
        Self {
            root,
            output,
            input,
        }
    }

    /// Layout from configuration, directories relative to `root`
    pub fn from_config(config: &ProvenanceConfig, root: PathBuf) -> Self {
        let output = ProvenanceConfig::resolve_dir(&root, &config.host.output_dir);
        let input = ProvenanceConfig::resolve_dir(&root, &config.host.input_dir);
        Self::new(root, output, input)
    }

    /// Host install root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl HostPaths for LocalHost {
    fn output_directory(&self) -> PathBuf {
        self.output.clone()
    }

    fn input_directory(&self) -> PathBuf {
        self.input.clone()
    }

    fn save_image_path(
        &self,
        prefix: &str,
        width: u32,
        height: u32,
    ) -> Result<SavePath, HostError> {
        let prefix = prefix
            .replace("%width%", &width.to_string())
            .replace("%height%", &height.to_string());

        let (subfolder, filename) = match prefix.rfind(['/', '\\']) {
            Some(idx) => (prefix[..idx].to_string(), prefix[idx + 1..].to_string()),
            None => (String::new(), prefix),
        };

        fs::create_dir_all(&self.output)?;
        let folder = ensure_within(&self.output, &self.output.join(&subfolder))?;
        fs::create_dir_all(&folder)?;

        let counter = next_counter(&folder, &filename)?
            .ok_or_else(|| HostError::CounterExhausted(filename.clone()))?;

        Ok(SavePath {
            folder,
            filename,
            counter,
            subfolder,
        })
    }

    fn annotated_filepath(&self, name: &str) -> PathBuf {
        if let Some(stripped) = name.strip_suffix(" [output]") {
            self.output.join(stripped)
        } else if let Some(stripped) = name.strip_suffix(" [input]") {
            self.input.join(stripped)
        } else {
            self.input.join(name)
        }
    }
}

/// One past the highest `<stem>_<digits>_...` counter already in `folder`.
///
/// `None` when the highest counter is already `u64::MAX`.
pub fn next_counter(folder: &Path, stem: &str) -> io::Result<Option<u64>> {
    let prefix = format!("{}_", stem);
    let mut highest = 0u64;

    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let digits = rest.split('_').next().unwrap_or("");
        if let Ok(n) = digits.parse::<u64>() {
            highest = highest.max(n);
        }
    }

    Ok(highest.checked_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host(dir: &Path) -> LocalHost {
        let root = dir.to_path_buf();
        LocalHost::new(root.clone(), root.join("output"), root.join("input"))
    }

    #[test]
    fn test_first_save_starts_at_one() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        let path = host.save_image_path("FMJ_Versioned", 512, 512).unwrap();
        assert_eq!(path.counter, 1);
        assert_eq!(path.filename, "FMJ_Versioned");
        assert_eq!(path.subfolder, "");
        assert!(path.folder.is_dir());
    }

    #[test]
    fn test_counter_continues_after_existing() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        let out = dir.path().join("output");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("FMJ_Versioned_00001_.png"), "").unwrap();
        fs::write(out.join("FMJ_Versioned_00007_.png"), "").unwrap();
        fs::write(out.join("FMJ_Versioned_00007_.json"), "").unwrap();
        fs::write(out.join("Other_00042_.png"), "").unwrap();

        let path = host.save_image_path("FMJ_Versioned", 64, 64).unwrap();
        assert_eq!(path.counter, 8);
    }

    #[test]
    fn test_counter_past_u32_range() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        let out = dir.path().join("output");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("x_4294967295_.png"), "").unwrap();

        assert_eq!(next_counter(&out, "x").unwrap(), Some(4_294_967_296));
        let path = host.save_image_path("x", 1, 1).unwrap();
        assert_eq!(path.counter, 4_294_967_296);
    }

    #[test]
    fn test_counter_exhausted_is_error() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        let out = dir.path().join("output");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join(format!("x_{}_.png", u64::MAX)), "").unwrap();

        assert_eq!(next_counter(&out, "x").unwrap(), None);
        let err = host.save_image_path("x", 1, 1).unwrap_err();
        assert!(matches!(err, HostError::CounterExhausted(ref stem) if stem == "x"));
    }

    #[test]
    fn test_subfolder_and_size_tokens() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        let path = host
            .save_image_path("renders/%width%x%height%", 640, 480)
            .unwrap();
        assert_eq!(path.subfolder, "renders");
        assert_eq!(path.filename, "640x480");
        assert!(path.folder.ends_with("renders"));
    }

    #[test]
    fn test_escaping_prefix_rejected() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        let err = host.save_image_path("../../evil/x", 1, 1).unwrap_err();
        assert!(matches!(err, HostError::Guard(GuardError::SecurityViolation { .. })));
    }

    #[test]
    fn test_annotated_filepath() {
        let dir = TempDir::new().unwrap();
        let host = host(dir.path());
        assert_eq!(
            host.annotated_filepath("a.png [output]"),
            dir.path().join("output").join("a.png")
        );
        assert_eq!(
            host.annotated_filepath("a.png"),
            dir.path().join("input").join("a.png")
        );
    }

    #[test]
    fn test_from_config_resolves_relative_dirs() {
        let config = ProvenanceConfig::default();
        let host = LocalHost::from_config(&config, PathBuf::from("/opt/comfy"));
        assert_eq!(host.output_directory(), PathBuf::from("/opt/comfy/output"));
        assert_eq!(host.input_directory(), PathBuf::from("/opt/comfy/input"));
    }
}
