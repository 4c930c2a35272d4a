//! Error types for provisioning.
//!
//! One unified error type for the whole step sequence, keeping error
//! plumbing out of the orchestration module. Every fatal variant
//! carries enough context to print the failing step plus a concrete
//! remediation.

use std::path::PathBuf;

use thiserror::Error;
use zimgen_core::artifacts::ArtifactId;
use zimgen_core::paths::PathError;

/// Errors that can occur during provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The interpreter prerequisite is missing. No fallback exists:
    /// nothing downstream can run without it.
    #[error(
        "Python interpreter not found (tried: {tried}). \
         Install Python 3.10 or newer and make sure it is on PATH, \
         then re-run 'zimgen --install'."
    )]
    PrerequisiteMissing { tried: String },

    /// The user declined to continue without a detected GPU.
    #[error("Installation cancelled: no GPU detected and continuation was declined")]
    CapabilityDeclined,

    /// Creating the isolated runtime failed.
    #[error("Failed to create the isolated runtime at {path}: {reason}")]
    RuntimeCreateFailed { path: PathBuf, reason: String },

    /// Every install strategy for a required package failed.
    #[error(
        "Failed to install required package '{package}' \
         (strategies tried: {attempts}). \
         Check your network connection and build tools, then re-run 'zimgen --install'."
    )]
    DependencyInstallFailed { package: String, attempts: String },

    /// Downloading a required artifact failed. The message includes the
    /// manual fallback: fetch the URL yourself and place the file at the
    /// target path.
    #[error(
        "Failed to download {artifact}: {reason}\n\
         As a manual fallback, download\n  {url}\n\
         and place the file at\n  {dest}"
    )]
    ArtifactDownloadFailed {
        artifact: ArtifactId,
        url: String,
        dest: PathBuf,
        reason: String,
    },

    /// Extracting the engine binary archive failed.
    #[error("Failed to extract engine archive: {0}")]
    ExtractionFailed(String),

    /// Writing the launcher entry point failed.
    #[error("Failed to write launcher at {path}: {reason}")]
    LauncherWriteFailed { path: PathBuf, reason: String },

    /// Path resolution or directory preparation failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;
