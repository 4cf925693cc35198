//! Built-in defaults
//!
//! Every configuration value has a default matching a stock host install, so
//! an absent or empty config file is valid.

/// File whose presence marks the host application's install root
pub const MARKER_FILE: &str = "folder_paths.py";

/// Extensions directory, relative to the host root
pub const EXTENSIONS_DIR: &str = "custom_nodes";

/// Output directory, relative to the host root
pub const OUTPUT_DIR: &str = "output";

/// Input directory, relative to the host root
pub const INPUT_DIR: &str = "input";

/// Virtualenv directory activated by restore scripts, relative to the host root
pub const VENV_DIR: &str = "venv";

/// Interpreter used for runtime probes and manager invocations
pub const PYTHON: &str = "python3";

/// Version-control binary
pub const GIT: &str = "git";

/// Directory name of the environment-manager extension
pub const MANAGER_EXTENSION: &str = "ComfyUI-Manager";

/// Manager command-line entry point, relative to the manager directory
pub const MANAGER_CLI: &str = "cm-cli.py";

/// Candidate manager snapshot directories, relative to the host root, in
/// order of preference
pub const SNAPSHOT_DIRS: &[&str] = &[
    "user/default/ComfyUI-Manager/snapshots",
    "user/__manager/snapshots",
];

/// Default filename prefix for versioned saves
pub const FILENAME_PREFIX: &str = "FMJ_Versioned";

/// Default filename prefix for snapshot saves
pub const SNAPSHOT_PREFIX: &str = "fmj";

/// PNG compression level (0-9)
pub const COMPRESS_LEVEL: u8 = 4;

/// Directory name this plugin is installed under inside the extensions dir
pub const PLUGIN_DIR: &str = "ComfyUI_FMJ_SaveImageVersions";

/// Files the metadata loader offers for selection
pub const SELECTABLE_PATTERNS: &[&str] = &["*.png", "*.json"];

pub(crate) fn marker_file() -> String {
    MARKER_FILE.to_string()
}

pub(crate) fn extensions_dir() -> String {
    EXTENSIONS_DIR.to_string()
}

pub(crate) fn output_dir() -> String {
    OUTPUT_DIR.to_string()
}

pub(crate) fn input_dir() -> String {
    INPUT_DIR.to_string()
}

pub(crate) fn venv_dir() -> String {
    VENV_DIR.to_string()
}

pub(crate) fn python() -> String {
    PYTHON.to_string()
}

pub(crate) fn git() -> String {
    GIT.to_string()
}

pub(crate) fn manager_extension() -> String {
    MANAGER_EXTENSION.to_string()
}

pub(crate) fn manager_cli() -> String {
    MANAGER_CLI.to_string()
}

pub(crate) fn snapshot_dirs() -> Vec<String> {
    SNAPSHOT_DIRS.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn filename_prefix() -> String {
    FILENAME_PREFIX.to_string()
}

pub(crate) fn snapshot_prefix() -> String {
    SNAPSHOT_PREFIX.to_string()
}

pub(crate) fn compress_level() -> u8 {
    COMPRESS_LEVEL
}

pub(crate) fn plugin_dir() -> String {
    PLUGIN_DIR.to_string()
}

pub(crate) fn selectable_patterns() -> Vec<String> {
    SELECTABLE_PATTERNS.iter().map(|s| s.to_string()).collect()
}
