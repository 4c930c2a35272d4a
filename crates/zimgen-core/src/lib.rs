//! Core domain types for zimgen.
//!
//! This crate holds everything the provisioner and the invoker share:
//! path resolution for the install root, the artifact catalog, the
//! environment descriptor, generation requests and the VRAM policy.
//! No network or process code lives here.

pub mod artifacts;
pub mod environment;
pub mod paths;
pub mod request;
pub mod settings;

pub use artifacts::{ArtifactDestination, ArtifactId, ArtifactKind, ArtifactSpec, Quantization};
pub use environment::{
    ArtifactStatus, DependencyRecord, EnvironmentDescriptor, EnvironmentMarker, GpuCapability,
};
pub use paths::{InstallLayout, PathError};
pub use request::{GenerationRequest, RequestError, ResolvedRequest};
pub use settings::{GenerationDefaults, VramPolicy};
