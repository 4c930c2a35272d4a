//! The generation request pipeline.
//!
//! One `invoke` call takes a raw request through the full sequence:
//! environment readiness, validation, default resolution, the VRAM
//! preflight, engine execution and output verification. The environment
//! is read fresh on every call; nothing is cached across requests.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use zimgen_core::environment::EnvironmentDescriptor;
use zimgen_core::paths::{InstallLayout, downloads_dir, ensure_parent_dir};
use zimgen_core::request::GenerationRequest;
use zimgen_core::settings::{GenerationDefaults, VramPolicy};

use crate::bridge::{deploy_driver, run_engine};
use crate::call::EngineCall;
use crate::error::GenerateError;
use crate::protocol::EngineEvent;

/// What a completed generation reports to the caller.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub image_path: PathBuf,
    /// The seed actually used, for reproduction.
    pub seed: u64,
    pub seed_was_drawn: bool,
    /// End-to-end wall time including model load.
    pub elapsed: Duration,
    /// Engine-side generation time, when the driver measured it.
    pub engine_elapsed_ms: Option<u64>,
}

/// Serve one generation request.
pub async fn invoke<F>(
    layout: InstallLayout,
    request: &GenerationRequest,
    defaults: &GenerationDefaults,
    on_event: F,
) -> Result<GenerationReport, GenerateError>
where
    F: FnMut(&EngineEvent),
{
    let started = Instant::now();

    let env = EnvironmentDescriptor::load(layout);
    ensure_ready(&env)?;

    request.validate()?;

    let output_dir = match &defaults.output_dir {
        Some(dir) => dir.clone(),
        None => downloads_dir()?,
    };
    let resolved = request.resolve(defaults, &output_dir)?;

    let policy = VramPolicy::for_capability(&env.gpu);
    preflight(&policy, resolved.width, resolved.height)?;

    ensure_parent_dir(&resolved.output_path)?;
    deploy_driver(&env.layout)?;

    let call = EngineCall::assemble(&env, resolved, policy)?;
    info!(
        seed = call.request.seed,
        width = call.request.width,
        height = call.request.height,
        steps = call.request.steps,
        "starting generation"
    );

    let outcome = run_engine(&call, on_event).await?;

    // Trust the file at the requested path, not the driver's claim.
    if !call.request.output_path.is_file() {
        return Err(GenerateError::OutputMissing(call.request.output_path));
    }

    Ok(GenerationReport {
        image_path: call.request.output_path,
        seed: call.request.seed,
        seed_was_drawn: call.request.seed_was_drawn,
        elapsed: started.elapsed(),
        engine_elapsed_ms: outcome.engine_elapsed_ms,
    })
}

/// Reject early when the install is incomplete, naming what is missing.
fn ensure_ready(env: &EnvironmentDescriptor) -> Result<(), GenerateError> {
    if env.is_ready() {
        return Ok(());
    }

    let mut missing = Vec::new();
    if !env.runtime_ready {
        missing.push("isolated runtime".to_string());
    }
    for id in env.missing_artifacts() {
        missing.push(id.to_string());
    }
    Err(GenerateError::NotProvisioned {
        missing: missing.join(", "),
    })
}

/// Reject requests whose estimated peak memory exceeds the budget.
///
/// An over-budget request fails here, before any model load, instead of
/// being silently shrunk or left to die in the allocator minutes later.
fn preflight(policy: &VramPolicy, width: u32, height: u32) -> Result<(), GenerateError> {
    if policy.fits(width, height) {
        return Ok(());
    }

    let estimated = VramPolicy::estimated_peak_bytes(width, height) / (1024 * 1024);
    let budget = policy.budget_bytes / (1024 * 1024);
    Err(GenerateError::InsufficientMemory {
        detail: format!(
            "a {width}x{height} image needs an estimated {estimated} MiB against a {budget} MiB budget"
        ),
        suggestion: "Request a smaller image, e.g. --width 768 --height 512".to_string(),
    })
}
