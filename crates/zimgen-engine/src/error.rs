//! Error types for the generation pipeline.

use thiserror::Error;
use zimgen_core::artifacts::ArtifactId;
use zimgen_core::request::RequestError;

/// Errors that can occur while serving a generation request.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The environment is not ready to generate. Lists what is missing
    /// so the remediation ('zimgen --install') is obvious.
    #[error(
        "Environment is not provisioned (missing: {missing}). \
         Run 'zimgen --install' first."
    )]
    NotProvisioned { missing: String },

    /// The request failed validation before reaching the engine.
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    /// The request would exceed the memory budget, or the engine ran
    /// out of memory mid-generation.
    #[error("Not enough memory for this request: {detail}. {suggestion}")]
    InsufficientMemory { detail: String, suggestion: String },

    /// A required artifact path could not be resolved.
    #[error("Artifact {0} is missing from the install; run 'zimgen --install'")]
    ArtifactMissing(ArtifactId),

    /// The engine process could not be started.
    #[error("Failed to start the generation engine: {0}")]
    EngineSpawn(String),

    /// The engine emitted a line outside the wire protocol contract.
    #[error("Engine protocol violation: {0}")]
    EngineProtocol(String),

    /// The engine reported a failure or exited without producing output.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The engine reported success but the output file is absent.
    #[error("Engine reported success but no image was written to {0}")]
    OutputMissing(std::path::PathBuf),

    /// Path resolution or directory preparation failed.
    #[error(transparent)]
    Path(#[from] zimgen_core::paths::PathError),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for generation operations.
pub type GenerateResult<T> = Result<T, GenerateError>;
