//! Directory confinement checks.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::GuardError;

/// Resolve a path to its canonical form, tolerating a missing tail.
///
/// Existing components are canonicalized as they are reached (symlinks
/// followed), missing ones are applied lexically. Returns `None` when the
/// path cannot be made absolute or runs through a dangling symlink.
pub fn resolve_lenient(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    if let Ok(canonical) = absolute.canonicalize() {
        return Some(canonical);
    }

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                if fs::symlink_metadata(&resolved).is_ok() {
                    resolved = resolved.canonicalize().ok()?;
                }
            }
        }
    }

    Some(resolved)
}

/// True iff `candidate` resolves to `base` or a descendant of it.
///
/// Comparison is component-wise on canonical paths, so `/out` never contains
/// `/output`. Anything that cannot be resolved is reported as outside.
pub fn is_within(base: &Path, candidate: &Path) -> bool {
    let Ok(base_real) = base.canonicalize() else {
        return false;
    };
    let Some(candidate_real) = resolve_lenient(candidate) else {
        return false;
    };
    candidate_real.starts_with(&base_real)
}

/// Fail-loud form of [`is_within`]; returns the resolved candidate path.
pub fn ensure_within(base: &Path, candidate: &Path) -> Result<PathBuf, GuardError> {
    let violation = || GuardError::SecurityViolation {
        base: base.to_path_buf(),
        path: candidate.to_path_buf(),
    };

    let base_real = base.canonicalize().map_err(|_| violation())?;
    let candidate_real = resolve_lenient(candidate).ok_or_else(violation)?;
    if candidate_real.starts_with(&base_real) {
        Ok(candidate_real)
    } else {
        Err(violation())
    }
}
