//! Driver invocation assembly.
//!
//! An `EngineCall` gathers everything one generation needs: artifact
//! paths from the install, the resolved request, and the memory policy
//! flags. It renders to the driver's argv in one place so the Rust side
//! and the Python side cannot drift apart silently.

use std::path::PathBuf;

use zimgen_core::artifacts::ArtifactId;
use zimgen_core::environment::EnvironmentDescriptor;
use zimgen_core::request::ResolvedRequest;
use zimgen_core::settings::VramPolicy;

use crate::error::GenerateError;

/// A fully assembled engine invocation.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub python: PathBuf,
    pub driver: PathBuf,
    pub diffusion_model: PathBuf,
    pub autoencoder: PathBuf,
    pub text_encoder: PathBuf,
    /// Directory holding the accelerated engine library.
    pub lib_dir: PathBuf,
    pub request: ResolvedRequest,
    pub policy: VramPolicy,
}

impl EngineCall {
    /// Assemble a call from a ready environment.
    pub fn assemble(
        env: &EnvironmentDescriptor,
        request: ResolvedRequest,
        policy: VramPolicy,
    ) -> Result<Self, GenerateError> {
        let artifact = |id: ArtifactId| {
            env.artifact_path(id)
                .ok_or(GenerateError::ArtifactMissing(id))
        };

        Ok(Self {
            python: env.layout.runtime_python(),
            driver: env.layout.driver_path.clone(),
            diffusion_model: artifact(ArtifactId::DiffusionModel)?,
            autoencoder: artifact(ArtifactId::Autoencoder)?,
            text_encoder: artifact(ArtifactId::TextEncoder)?,
            lib_dir: env.layout.bin_dir.clone(),
            request,
            policy,
        })
    }

    /// Render the driver's argument vector (everything after the script
    /// path).
    pub fn to_args(&self) -> Vec<String> {
        let req = &self.request;
        let mut args = vec![
            "--diffusion-model".to_string(),
            self.diffusion_model.display().to_string(),
            "--vae".to_string(),
            self.autoencoder.display().to_string(),
            "--text-encoder".to_string(),
            self.text_encoder.display().to_string(),
            "--lib-dir".to_string(),
            self.lib_dir.display().to_string(),
            "--prompt".to_string(),
            req.prompt.clone(),
            "--width".to_string(),
            req.width.to_string(),
            "--height".to_string(),
            req.height.to_string(),
            "--steps".to_string(),
            req.steps.to_string(),
            "--seed".to_string(),
            req.seed.to_string(),
            "--output".to_string(),
            req.output_path.display().to_string(),
        ];

        if !req.negative_prompt.is_empty() {
            args.push("--negative".to_string());
            args.push(req.negative_prompt.clone());
        }

        if self.policy.offload_to_cpu {
            args.push("--offload-to-cpu".to_string());
        }
        if self.policy.vae_on_cpu {
            args.push("--vae-on-cpu".to_string());
        }
        if self.policy.vae_tiling {
            args.push("--vae-tiling".to_string());
        }
        if self.policy.decode_only {
            args.push("--vae-decode-only".to_string());
        }

        args
    }
}
