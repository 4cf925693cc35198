//! FMJ Provenance CLI
//!
//! Entry point for the `fmj` command-line tool.

use clap::{Parser, Subcommand};
use fmj_guard::content_hash;
use fmj_provenance::config::{ProvenanceConfig, DEFAULT_CONFIG_PATH};
use fmj_provenance::embed::{decode_png, ManagerSnapshotTool};
use fmj_provenance::env_snapshot::EnvironmentSnapshot;
use fmj_provenance::fingerprint::{resolve_host_root, FingerprintCache};
use fmj_provenance::host::LocalHost;
use fmj_provenance::nodes::{LoadMetadata, SaveImageVersions, SaveOptions};
use fmj_provenance::pixels::PixelBatch;
use fmj_provenance::record::Seed;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fmj")]
#[command(about = "Version provenance for generated images", version)]
struct Cli {
    /// Path to config file (default: .fmj/provenance.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Host install root, overriding config and detection
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current environment fingerprint
    Fingerprint {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Save an image into the output directory with embedded provenance
    Save {
        /// Source PNG whose pixels are saved
        input: PathBuf,

        /// Filename prefix (default from config)
        #[arg(long)]
        prefix: Option<String>,

        /// Prompt text to record
        #[arg(long, default_value = "")]
        prompt: String,

        /// Seed to record
        #[arg(long, default_value = "0")]
        seed: String,

        /// Workflow graph JSON file to record as prompt_dict
        #[arg(long)]
        workflow: Option<PathBuf>,

        /// Also write a .json sidecar
        #[arg(long)]
        sidecar: bool,

        /// Capture an environment-manager snapshot per image
        #[arg(long)]
        snapshot: bool,
    },

    /// Load provenance from a saved file and report drift
    Load {
        /// File name inside the output directory
        file: String,

        /// Write the restore script here when one is produced
        #[arg(long)]
        script: Option<PathBuf>,
    },

    /// List loadable files in the output directory
    List,

    /// Write the plain-text environment snapshot at the host root
    Snapshot,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FMJ_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (config, root) = load_context(cli.config, cli.root);

    match cli.command {
        Commands::Fingerprint { json } => run_fingerprint(&config, root, json),
        Commands::Save {
            input,
            prefix,
            prompt,
            seed,
            workflow,
            sidecar,
            snapshot,
        } => {
            let mut options =
                SaveOptions::new(prefix.unwrap_or_else(|| config.save.filename_prefix.clone()));
            options.prompt = prompt;
            options.seed = Seed::from_display(&seed);
            options.save_sidecar = sidecar;
            options.create_snapshot = snapshot;
            options.prompt_graph = workflow.map(|path| load_workflow(&path));
            run_save(&config, root, &input, &options);
        }
        Commands::Load { file, script } => run_load(&config, root, &file, script),
        Commands::List => run_list(&config, root),
        Commands::Snapshot => run_snapshot(&config, root),
    }
}

fn load_context(config_path: Option<PathBuf>, root: Option<PathBuf>) -> (ProvenanceConfig, PathBuf) {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = match ProvenanceConfig::load_or_default(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    if root.is_some() {
        config.host.root = root;
    }

    let root = resolve_host_root(&config.host);
    tracing::debug!(root = %root.display(), "host root resolved");
    (config, root)
}

fn load_workflow(path: &Path) -> serde_json::Value {
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error reading workflow {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_fingerprint(config: &ProvenanceConfig, root: PathBuf, json_output: bool) {
    let cache = FingerprintCache::from_config(config, root);
    let fingerprint = cache.get_or_collect();

    if json_output {
        match serde_json::to_string_pretty(fingerprint) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Host root: {}", cache.root().display());
    println!();
    for (key, value) in fingerprint.scalar_fields() {
        println!("  {}: {}", key, value);
    }
    if fingerprint.extensions.is_empty() {
        println!("  No version-controlled extensions.");
    } else {
        println!("  Extensions ({}):", fingerprint.extensions.len());
        for (name, version) in &fingerprint.extensions {
            println!("    {}: {}", name, version);
        }
    }
}

fn run_save(config: &ProvenanceConfig, root: PathBuf, input: &Path, options: &SaveOptions) {
    let decoded = match decode_png(input) {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    let pixels = match PixelBatch::from_u8(decoded.height, decoded.width, 3, &decoded.rgb) {
        Ok(pixels) => pixels,
        Err(e) => {
            eprintln!("Error reading {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    let host = LocalHost::from_config(config, root.clone());
    let cache = FingerprintCache::from_config(config, root.clone());
    let tool = ManagerSnapshotTool::from_config(config, &root);
    let node = SaveImageVersions::new(&host, &cache, config.save.compress_level)
        .with_snapshot_tool(&tool);

    match node.save_images(&pixels, options) {
        Ok(saved) => {
            for image in saved {
                if image.subfolder.is_empty() {
                    println!("Saved {}", image.filename);
                } else {
                    println!("Saved {}/{}", image.subfolder, image.filename);
                }
            }
        }
        Err(e) => {
            eprintln!("Error saving image: {}", e);
            process::exit(1);
        }
    }
}

fn run_load(config: &ProvenanceConfig, root: PathBuf, file: &str, script_path: Option<PathBuf>) {
    let host = LocalHost::from_config(config, root.clone());
    let cache = FingerprintCache::from_config(config, root);
    let node = match LoadMetadata::new(&host, &cache, config) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let load = match node.load_metadata(file) {
        Ok(load) => load,
        Err(e) => {
            eprintln!("Error loading {}: {}", file, e);
            process::exit(1);
        }
    };

    println!("{}", load.version_report);

    if load.restore_script.is_empty() {
        return;
    }
    match script_path {
        Some(path) => {
            if let Err(e) = fs::write(&path, &load.restore_script) {
                eprintln!("Error writing script {}: {}", path.display(), e);
                process::exit(1);
            }
            println!();
            println!("Restore script written to {}", path.display());
        }
        None => {
            println!();
            println!("{}", load.restore_script);
        }
    }
}

fn run_list(config: &ProvenanceConfig, root: PathBuf) {
    let host = LocalHost::from_config(config, root.clone());
    let cache = FingerprintCache::from_config(config, root);
    match LoadMetadata::new(&host, &cache, config) {
        Ok(node) => {
            for file in node.selectable_files() {
                println!("{}", file);
            }
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn run_snapshot(config: &ProvenanceConfig, root: PathBuf) {
    let cache = FingerprintCache::from_config(config, root);
    let snapshot = EnvironmentSnapshot::from_cache(&cache);

    match snapshot.write(cache.root()) {
        Ok(path) => {
            println!("Snapshot written to {}", path.display());
            match content_hash(&path) {
                Ok(digest) => println!("  sha256: {}", digest),
                Err(e) => tracing::warn!("cannot hash snapshot: {}", e),
            }
        }
        Err(e) => {
            eprintln!("Error writing snapshot: {}", e);
            process::exit(1);
        }
    }
}
