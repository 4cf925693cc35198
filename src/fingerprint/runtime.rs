//! Runtime version probes
//!
//! The host runs models inside a Python interpreter; its version, the tensor
//! framework version and the accelerator runtime are read from that
//! interpreter.

use std::process::{Command, Stdio};

use super::{NO_ACCELERATOR, UNKNOWN};

/// Placeholder for an absent accelerator device name
pub const NO_DEVICE: &str = "N/A";

/// Versions reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersions {
    pub runtime: String,
    pub numeric_framework: String,
    /// Accelerator runtime version, or `"CPU"`
    pub accelerator: String,
    /// Accelerator device name, or `"N/A"`
    pub device: String,
}

impl RuntimeVersions {
    /// Everything unknown, no accelerator
    pub fn unknown() -> Self {
        Self {
            runtime: UNKNOWN.to_string(),
            numeric_framework: UNKNOWN.to_string(),
            accelerator: NO_ACCELERATOR.to_string(),
            device: NO_DEVICE.to_string(),
        }
    }
}

/// Source of runtime versions
pub trait RuntimeProbe: Send + Sync {
    /// Never fails; unresolvable values degrade to sentinels.
    fn probe(&self) -> RuntimeVersions;
}

/// Fixed versions, from configuration or tests
#[derive(Debug, Clone)]
pub struct StaticRuntimeProbe {
    versions: RuntimeVersions,
}

impl StaticRuntimeProbe {
    pub fn new(versions: RuntimeVersions) -> Self {
        Self { versions }
    }
}

impl RuntimeProbe for StaticRuntimeProbe {
    fn probe(&self) -> RuntimeVersions {
        self.versions.clone()
    }
}

/// One line per value: runtime, framework, accelerator, device.
const PROBE_SCRIPT: &str = "import sys
print(sys.version.split()[0])
try:
    import torch
    cuda = torch.cuda.is_available()
    print(torch.__version__)
    print(torch.version.cuda if cuda and torch.version.cuda else 'CPU')
    print(torch.cuda.get_device_name(0) if cuda else 'N/A')
except Exception:
    print('unknown')
    print('CPU')
    print('N/A')
";

/// Queries a Python interpreter for its runtime versions
#[derive(Debug, Clone)]
pub struct PythonRuntimeProbe {
    interpreter: String,
}

impl PythonRuntimeProbe {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl RuntimeProbe for PythonRuntimeProbe {
    fn probe(&self) -> RuntimeVersions {
        let output = Command::new(&self.interpreter)
            .args(["-c", PROBE_SCRIPT])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                parse_probe_output(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                tracing::warn!(
                    interpreter = %self.interpreter,
                    status = ?output.status.code(),
                    "runtime probe failed"
                );
                RuntimeVersions::unknown()
            }
            Err(e) => {
                tracing::warn!(interpreter = %self.interpreter, "runtime probe unavailable: {}", e);
                RuntimeVersions::unknown()
            }
        }
    }
}

/// Parse the probe script's stdout, defaulting missing or blank lines
pub fn parse_probe_output(stdout: &str) -> RuntimeVersions {
    let mut lines = stdout.lines().map(str::trim);
    let mut next_or = |fallback: &str| {
        lines
            .next()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    };

    RuntimeVersions {
        runtime: next_or(UNKNOWN),
        numeric_framework: next_or(UNKNOWN),
        accelerator: next_or(NO_ACCELERATOR),
        device: next_or(NO_DEVICE),
    }
}
