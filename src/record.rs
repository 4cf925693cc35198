//! Generation records and their wire keys

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fingerprint::VersionFingerprint;

/// Keys used in PNG text chunks and sidecar documents
pub mod keys {
    pub const PROMPT: &str = "prompt";
    pub const SEED: &str = "seed";
    pub const PROMPT_DICT: &str = "prompt_dict";
    pub const EXTRA_PNGINFO: &str = "extra_pnginfo";
    pub const VERSIONS: &str = "versions";
    pub const RUNTIME_VERSION: &str = "Python_Version";
    pub const FRAMEWORK_VERSION: &str = "PyTorch_Version";
    pub const ACCELERATOR_VERSION: &str = "CUDA_Version";
    pub const HOST_VERSION: &str = "ComfyUI_Version";
    pub const EXTENSIONS: &str = "Custom_Nodes_Versions";
    pub const SNAPSHOT: &str = "fmj_snapshot";
    pub const POSITIVE: &str = "positive";
    pub const NEGATIVE: &str = "negative";

    /// Keys owned by the embedder; extra fields may not shadow them
    pub const RESERVED: &[&str] = &[
        PROMPT,
        SEED,
        PROMPT_DICT,
        RUNTIME_VERSION,
        FRAMEWORK_VERSION,
        ACCELERATOR_VERSION,
        HOST_VERSION,
        EXTENSIONS,
        SNAPSHOT,
    ];

    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }
}

/// Seed display when none was recorded
pub const UNKNOWN_SEED: &str = "unknown";

/// Generation seed: numeric when the host supplied a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Number(u64),
    Text(String),
}

impl Seed {
    pub fn unknown() -> Self {
        Seed::Text(UNKNOWN_SEED.to_string())
    }

    /// Parse a display string, recovering the numeric form when possible
    pub fn from_display(text: &str) -> Self {
        match text.parse::<u64>() {
            Ok(n) => Seed::Number(n),
            Err(_) => Seed::Text(text.to_string()),
        }
    }

    /// Interpret a sidecar `seed` value; numbers are truncated to integers
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Seed::Number(u)
                } else if let Some(i) = n.as_i64() {
                    Seed::Text(i.to_string())
                } else {
                    let f = n.as_f64().unwrap_or(0.0).trunc();
                    if f >= 0.0 && f <= u64::MAX as f64 {
                        Seed::Number(f as u64)
                    } else {
                        Seed::Text(format!("{:.0}", f))
                    }
                }
            }
            Value::String(s) => Seed::Text(s.clone()),
            Value::Bool(b) => Seed::Number(u64::from(*b)),
            Value::Null => Seed::unknown(),
            other => Seed::Text(other.to_string()),
        }
    }
}

impl Default for Seed {
    fn default() -> Self {
        Seed::unknown()
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Number(n) => write!(f, "{}", n),
            Seed::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Seed {
    fn from(n: u64) -> Self {
        Seed::Number(n)
    }
}

/// Everything embedded into a saved artifact
///
/// Built once at save time and never changed afterwards; the reader
/// reconstructs a new record instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationRecord {
    pub prompt_text: String,
    pub seed: Seed,
    /// Host workflow graph (`prompt_dict`)
    pub prompt_graph: Option<Value>,
    /// Host-defined passthrough fields (`extra_pnginfo`)
    pub extra_fields: Map<String, Value>,
    /// Name of the associated environment snapshot
    pub snapshot_reference: Option<String>,
    pub fingerprint: VersionFingerprint,
}

impl GenerationRecord {
    pub fn new(fingerprint: VersionFingerprint) -> Self {
        Self {
            fingerprint,
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_text = prompt.into();
        self
    }

    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = seed.into();
        self
    }

    pub fn with_prompt_graph(mut self, graph: Option<Value>) -> Self {
        self.prompt_graph = graph;
        self
    }

    pub fn with_extra_fields(mut self, extra: Map<String, Value>) -> Self {
        self.extra_fields = extra;
        self
    }

    pub fn with_snapshot_reference(mut self, reference: Option<String>) -> Self {
        self.snapshot_reference = reference;
        self
    }
}
