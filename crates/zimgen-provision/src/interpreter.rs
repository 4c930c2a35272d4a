//! Interpreter prerequisite check.
//!
//! A system Python is the one hard prerequisite: the isolated runtime is
//! a venv and the engine runs inside it. Absence is fatal with no
//! fallback.

use std::path::PathBuf;

use crate::error::ProvisionError;

#[cfg(target_os = "windows")]
const PYTHON_CANDIDATES: &[&str] = &["python"];

#[cfg(not(target_os = "windows"))]
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Find a Python interpreter suitable for bootstrapping the runtime.
pub fn find_python() -> Result<PathBuf, ProvisionError> {
    for candidate in PYTHON_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(path);
        }
    }

    Err(ProvisionError::PrerequisiteMissing {
        tried: PYTHON_CANDIDATES.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_python_error_names_candidates() {
        let err = ProvisionError::PrerequisiteMissing {
            tried: PYTHON_CANDIDATES.join(", "),
        };
        let msg = err.to_string();
        assert!(msg.contains("python"));
        assert!(msg.contains("zimgen --install"));
    }
}
