//! Environment provisioning for zimgen.
//!
//! Turns a bare machine into a ready install: bootstrap interpreter
//! discovery, GPU probing, the isolated Python runtime, engine packages
//! with accelerated-first fallback chains, model and engine artifact
//! downloads, and the launcher script. The sequence is resumable; every
//! step checks its own target state before doing work.

pub mod download;
pub mod error;
pub mod gpu;
pub mod interpreter;
pub mod launcher;
pub mod packages;
pub mod provisioner;
pub mod runtime;

pub use error::{ProvisionError, ProvisionResult};
pub use provisioner::{
    ProvisionContext, ProvisionReport, ProvisionStep, StepFailure, StepStatus, run, step_sequence,
};
