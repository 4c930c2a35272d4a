//! Generation defaults and the VRAM policy.
//!
//! Defaults are tuned for the few-step distilled Z-Image-Turbo model on
//! the 4 GB VRAM target profile: 768x512 is the largest size validated
//! to fit that budget, and 4 steps is what the turbo model wants.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::environment::GpuCapability;

pub const DEFAULT_WIDTH: u32 = 768;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_STEPS: u32 = 4;

/// Assumed VRAM budget when no GPU was detected or capability is
/// unknown: the 4 GB target profile.
pub const DEFAULT_VRAM_BUDGET_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Above this much VRAM the conservative offloading defaults are
/// relaxed; below it (or unknown) the low-VRAM profile applies.
const LOW_VRAM_CEILING_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Application-level generation defaults.
///
/// Explicit CLI flags always override these; these in turn can be
/// overridden through environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    /// Overrides the downloads directory for default output placement.
    pub output_dir: Option<PathBuf>,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            steps: DEFAULT_STEPS,
            output_dir: None,
        }
    }
}

impl GenerationDefaults {
    /// Build defaults from environment variables.
    ///
    /// `ZIMGEN_WIDTH`, `ZIMGEN_HEIGHT`, `ZIMGEN_STEPS` and
    /// `ZIMGEN_OUTPUT_DIR` are honored; anything unset or unparseable
    /// falls back to the built-in value.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            width: env_u32("ZIMGEN_WIDTH").unwrap_or(base.width),
            height: env_u32("ZIMGEN_HEIGHT").unwrap_or(base.height),
            steps: env_u32("ZIMGEN_STEPS").unwrap_or(base.steps),
            output_dir: env::var("ZIMGEN_OUTPUT_DIR").ok().map(PathBuf::from),
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok()?.trim().parse().ok()
}

/// VRAM-conserving engine settings derived from the detected capability.
///
/// These are fixed policy defaults for the target profile, not
/// user-tunable per request: offload non-critical layers to host memory,
/// load the autoencoder in decode-only mode, and tile the decode stage
/// to bound peak memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VramPolicy {
    pub offload_to_cpu: bool,
    pub vae_on_cpu: bool,
    pub vae_tiling: bool,
    /// The decode half of the autoencoder is all generation needs.
    pub decode_only: bool,
    /// Budget used by the invoker's preflight estimate.
    pub budget_bytes: u64,
}

impl VramPolicy {
    /// Derive the policy for a capability.
    pub fn for_capability(gpu: &GpuCapability) -> Self {
        match gpu.vram_bytes() {
            Some(vram) if vram >= LOW_VRAM_CEILING_BYTES => Self {
                offload_to_cpu: false,
                vae_on_cpu: false,
                vae_tiling: false,
                decode_only: true,
                budget_bytes: vram,
            },
            Some(vram) => Self {
                offload_to_cpu: true,
                vae_on_cpu: true,
                vae_tiling: true,
                decode_only: true,
                budget_bytes: vram,
            },
            // NotDetected or Unknown: assume the 4 GB target profile.
            None => Self {
                offload_to_cpu: true,
                vae_on_cpu: true,
                vae_tiling: true,
                decode_only: true,
                budget_bytes: DEFAULT_VRAM_BUDGET_BYTES,
            },
        }
    }

    /// Rough peak-memory estimate for a request at this policy.
    ///
    /// Latents plus decode activations scale with the pixel count; the
    /// 512 bytes/pixel coefficient is deliberately pessimistic so the
    /// preflight only rejects requests that cannot plausibly fit.
    pub fn estimated_peak_bytes(width: u32, height: u32) -> u64 {
        u64::from(width) * u64::from(height) * 512
    }

    /// Whether a request is expected to fit this policy's budget.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        Self::estimated_peak_bytes(width, height) <= self.budget_bytes
    }
}
