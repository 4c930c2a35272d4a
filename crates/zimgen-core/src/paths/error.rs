//! Error type for path resolution and directory operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or preparing zimgen paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// No usable base directory could be determined for the install root.
    #[error(
        "Could not determine an install root for zimgen. \
         Set ZIMGEN_HOME to a writable directory."
    )]
    NoInstallRoot,

    /// The user's home directory could not be resolved.
    #[error("Could not determine the home directory")]
    NoHomeDirectory,

    /// A path that must be a directory is something else.
    #[error("Path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Directory creation failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// The directory exists but is not writable.
    #[error("Directory is not writable: {path} ({reason})")]
    NotWritable { path: PathBuf, reason: String },
}
