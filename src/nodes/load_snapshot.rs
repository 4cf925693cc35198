//! Load Image + Snapshot

use std::fs;
use std::path::{Path, PathBuf};

use fmj_guard::ensure_within;

use crate::config::ProvenanceConfig;
use crate::embed::decode_png;
use crate::host::HostPaths;
use crate::pixels::PixelBatch;
use crate::record::keys;

use super::NodeError;

const SNAPSHOT_TXT_SUFFIX: &str = ".snapshot.txt";

/// Outputs of an image load
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotLoad {
    /// `[1, h, w, 3]` pixels
    pub image: PixelBatch,
    pub positive: String,
    pub negative: String,
    /// Snapshot text, or a notice when none was found
    pub config_info: String,
    pub restore_command: String,
}

/// Shell line that restores `snapshot` (relative to the host root)
pub fn restore_command(extensions_dir: &str, plugin_dir: &str, snapshot: &Path, windows: bool) -> String {
    let command = if windows {
        format!(
            "{}\\{}\\restore_snapshot.bat \"{}\"",
            extensions_dir,
            plugin_dir,
            snapshot.display().to_string().replace('/', "\\")
        )
    } else {
        format!(
            "./{}/{}/restore_snapshot.sh \"{}\"",
            extensions_dir,
            plugin_dir,
            snapshot.display()
        )
    };

    format!(
        "# Open a terminal in the ComfyUI directory, then paste this line:\n\
         # Quit ComfyUI before restoring!\n\
         {}",
        command
    )
}

/// Loads a saved image, its prompts and its environment snapshot
pub struct LoadImageWithSnapshot<'a> {
    host: &'a dyn HostPaths,
    host_root: PathBuf,
    extensions_dir: String,
    plugin_dir: String,
    windows: bool,
}

impl<'a> LoadImageWithSnapshot<'a> {
    pub fn new(host: &'a dyn HostPaths, host_root: PathBuf, config: &ProvenanceConfig) -> Self {
        Self {
            host,
            host_root,
            extensions_dir: config.host.extensions_dir.clone(),
            plugin_dir: config.save.plugin_dir.clone(),
            windows: cfg!(windows),
        }
    }

    /// Emit the Windows `.bat` form of the restore command
    pub fn with_windows_commands(mut self, windows: bool) -> Self {
        self.windows = windows;
        self
    }

    /// Load `image`, a `.png` selection from the input directory.
    ///
    /// Only the final path segment of the selection is used.
    pub fn load(&self, image: &str) -> Result<SnapshotLoad, NodeError> {
        let name = image.rsplit(['/', '\\']).next().unwrap_or(image);
        if !name.ends_with(".png") {
            return Err(NodeError::InvalidSelection(format!(
                "{}: expected a .png file",
                image
            )));
        }

        let input = self.host.input_directory();
        let path = ensure_within(&input, &self.host.annotated_filepath(name))?;

        let decoded = decode_png(&path)?;
        let pixels = PixelBatch::from_u8(decoded.height, decoded.width, 3, &decoded.rgb)?;
        let text_value = |key: &str| decoded.text.get(key).cloned().unwrap_or_default();

        let stem = name.trim_end_matches(".png");
        let snapshot_name = format!("{}{}", stem, SNAPSHOT_TXT_SUFFIX);
        let found = [self.host.output_directory(), input]
            .into_iter()
            .map(|dir| dir.join(&snapshot_name))
            .find(|candidate| candidate.is_file());

        let (config_info, restore) = match found {
            Some(snapshot) => {
                let relative = snapshot
                    .strip_prefix(&self.host_root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| snapshot.clone());
                (
                    fs::read_to_string(&snapshot)?,
                    restore_command(&self.extensions_dir, &self.plugin_dir, &relative, self.windows),
                )
            }
            None => {
                tracing::debug!(image = %name, "no snapshot text next to image");
                (
                    "[WARN] .snapshot.txt file not found.".to_string(),
                    "# Generate an image with 'Save Image + Snapshot (FMJ)'.".to_string(),
                )
            }
        };

        Ok(SnapshotLoad {
            image: pixels,
            positive: text_value(keys::POSITIVE),
            negative: text_value(keys::NEGATIVE),
            config_info,
            restore_command: restore,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::png_chunks::write_png;
    use crate::host::LocalHost;
    use tempfile::TempDir;

    fn setup(root: &Path) -> LocalHost {
        fs::create_dir_all(root.join("input")).unwrap();
        fs::create_dir_all(root.join("output")).unwrap();
        LocalHost::new(root.to_path_buf(), root.join("output"), root.join("input"))
    }

    fn write_sample(path: &Path) {
        let text = vec![
            ("positive".to_string(), "a knight".to_string()),
            ("negative".to_string(), "blurry".to_string()),
        ];
        write_png(path, 2, 1, 4, &[255, 0, 0, 255, 0, 0, 255, 128], &text, 4).unwrap();
    }

    #[test]
    fn test_load_with_snapshot() {
        let dir = TempDir::new().unwrap();
        let host = setup(dir.path());
        write_sample(&dir.path().join("input/fmj_20240601_120000_00.png"));
        fs::write(
            dir.path().join("output/fmj_20240601_120000_00.snapshot.txt"),
            "Python: 3.11.9\n",
        )
        .unwrap();

        let node = LoadImageWithSnapshot::new(&host, dir.path().to_path_buf(), &ProvenanceConfig::default())
            .with_windows_commands(false);
        let load = node.load("fmj_20240601_120000_00.png").unwrap();

        assert_eq!(load.image.len(), 1);
        assert_eq!((load.image.width(), load.image.height(), load.image.channels()), (2, 1, 3));
        assert_eq!(load.image.frame_u8(0).unwrap(), vec![255, 0, 0, 0, 0, 255]);
        assert_eq!(load.positive, "a knight");
        assert_eq!(load.negative, "blurry");
        assert_eq!(load.config_info, "Python: 3.11.9\n");
        assert!(load.restore_command.ends_with(
            "./custom_nodes/ComfyUI_FMJ_SaveImageVersions/restore_snapshot.sh \"output/fmj_20240601_120000_00.snapshot.txt\""
        ));
    }

    #[test]
    fn test_snapshot_missing() {
        let dir = TempDir::new().unwrap();
        let host = setup(dir.path());
        write_sample(&dir.path().join("input/a.png"));

        let node = LoadImageWithSnapshot::new(&host, dir.path().to_path_buf(), &ProvenanceConfig::default());
        let load = node.load("a.png").unwrap();
        assert!(load.config_info.contains("not found"));
        assert!(load.restore_command.starts_with('#'));
    }

    #[test]
    fn test_selection_rules() {
        let dir = TempDir::new().unwrap();
        let host = setup(dir.path());
        write_sample(&dir.path().join("input/a.png"));
        let node = LoadImageWithSnapshot::new(&host, dir.path().to_path_buf(), &ProvenanceConfig::default());

        assert!(matches!(node.load("a.jpg"), Err(NodeError::InvalidSelection(_))));
        // Directory parts are dropped, so this resolves to input/a.png.
        assert!(node.load("../../a.png").is_ok());
        assert!(matches!(node.load("missing.png"), Err(NodeError::Decode(_))));
    }

    #[test]
    fn test_windows_command() {
        let cmd = restore_command(
            "custom_nodes",
            "ComfyUI_FMJ_SaveImageVersions",
            Path::new("output/x.snapshot.txt"),
            true,
        );
        assert!(cmd.ends_with(
            "custom_nodes\\ComfyUI_FMJ_SaveImageVersions\\restore_snapshot.bat \"output\\x.snapshot.txt\""
        ));
    }
}
