//! Path resolution for the zimgen install root and user-facing locations.
//!
//! This module provides the canonical path resolution for all zimgen
//! components:
//! - The install root and its subdirectories (runtime, models, bin)
//! - The launcher and driver entry points
//! - The user's downloads directory for generated images
//!
//! # Design
//!
//! - Returns `PathBuf` and `PathError` for clear error handling
//! - No interactive/terminal I/O - callers handle user prompts separately
//! - All paths derive from a single root so tests can anchor a layout
//!   at a temp directory with `InstallLayout::at`

mod ensure;
mod error;

use std::env;
use std::path::{Path, PathBuf};

pub use ensure::{ensure_directory, verify_writable};
pub use error::PathError;

/// Environment variable overriding the install root.
pub const INSTALL_ROOT_ENV: &str = "ZIMGEN_HOME";

/// Directory name of the install root under the platform base dir.
const APP_DIR_NAME: &str = "zimgen";

#[cfg(windows)]
const LAUNCHER_FILE_NAME: &str = "generate.cmd";
#[cfg(not(windows))]
const LAUNCHER_FILE_NAME: &str = "generate.sh";

/// All paths owned by one install root, captured in a single struct.
///
/// This is the filesystem half of the Environment Descriptor. Everything
/// the provisioner writes and the invoker reads lives under `root`; the
/// root itself is destroyed only by an explicit uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// The install root. Owns all subordinate state.
    pub root: PathBuf,
    /// Isolated package runtime (Python venv).
    pub runtime_dir: PathBuf,
    /// Model artifacts (diffusion model, autoencoder, text encoder).
    pub models_dir: PathBuf,
    /// Engine binary and shared libraries.
    pub bin_dir: PathBuf,
    /// Delegating launcher entry point.
    pub launcher_path: PathBuf,
    /// Persisted descriptor marker (`environment.json`).
    pub descriptor_path: PathBuf,
    /// Deployed engine driver script.
    pub driver_path: PathBuf,
}

impl InstallLayout {
    /// Resolve the layout from the ambient environment.
    ///
    /// `ZIMGEN_HOME` wins when set; otherwise the platform-local data
    /// directory is used (`%LOCALAPPDATA%` on Windows, `~/.cache` style
    /// cache dir elsewhere), matching where earlier versions of the tool
    /// kept their state.
    pub fn resolve() -> Result<Self, PathError> {
        if let Ok(overridden) = env::var(INSTALL_ROOT_ENV) {
            let trimmed = overridden.trim();
            if !trimmed.is_empty() {
                return Ok(Self::at(PathBuf::from(trimmed)));
            }
        }

        let base = platform_base_dir().ok_or(PathError::NoInstallRoot)?;
        Ok(Self::at(base.join(APP_DIR_NAME)))
    }

    /// Anchor a layout at an explicit root. Used by tests and by the
    /// provisioner when the root is already known.
    pub fn at(root: PathBuf) -> Self {
        let runtime_dir = root.join("runtime");
        let models_dir = root.join("models");
        let bin_dir = root.join("bin");
        let launcher_path = root.join(LAUNCHER_FILE_NAME);
        let descriptor_path = root.join("environment.json");
        let driver_path = root.join("zimgen_driver.py");
        Self {
            root,
            runtime_dir,
            models_dir,
            bin_dir,
            launcher_path,
            descriptor_path,
            driver_path,
        }
    }

    /// Path to the isolated runtime's Python interpreter.
    ///
    /// The interpreter doubles as the venv presence check: the runtime
    /// exists exactly when this file does.
    pub fn runtime_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.runtime_dir.join("Scripts").join("python.exe")
        } else {
            let bin = self.runtime_dir.join("bin");
            let python3 = bin.join("python3");
            if python3.exists() {
                python3
            } else {
                bin.join("python")
            }
        }
    }

    /// Freshness marker for installed runtime packages.
    pub fn packages_marker(&self) -> PathBuf {
        self.runtime_dir.join(".zimgen-packages.json")
    }
}

/// Platform base directory for application state.
fn platform_base_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        dirs::cache_dir()
    }
}

/// The user's downloads directory, where generated images land by default.
///
/// Falls back to `~/Downloads` and finally the home directory itself when
/// the platform doesn't report a downloads folder.
pub fn downloads_dir() -> Result<PathBuf, PathError> {
    if let Some(dir) = dirs::download_dir() {
        return Ok(dir);
    }

    let home = dirs::home_dir().ok_or(PathError::NoHomeDirectory)?;
    let downloads = home.join("Downloads");
    if downloads.is_dir() {
        Ok(downloads)
    } else {
        Ok(home)
    }
}

/// Ensure the parent directory of a path exists.
pub fn ensure_parent_dir(path: &Path) -> Result<(), PathError> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    Ok(())
}
