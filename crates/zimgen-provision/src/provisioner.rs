//! The provisioning state machine.
//!
//! An ordered list of steps, each with a state-derived `is_satisfied`
//! predicate and a `run` action. A satisfied step is a no-op, which is
//! the whole idempotence story: re-running the provisioner resumes from
//! whichever steps are not yet satisfied, with no sequence bookkeeping.
//!
//! Any fatal step halts the sequence; no rollback is performed.

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::info;

use zimgen_core::artifacts::{self, ArtifactSpec, Quantization};
use zimgen_core::environment::{DependencyRecord, EnvironmentMarker, GpuCapability};
use zimgen_core::paths::{InstallLayout, ensure_directory};

use crate::download::fetch_artifact;
use crate::error::ProvisionError;
use crate::launcher::write_launcher;
use crate::{gpu, interpreter, packages, runtime};

/// Shared state threaded through the step sequence.
pub struct ProvisionContext {
    pub layout: InstallLayout,
    pub quant: Quantization,
    pub catalog: Vec<ArtifactSpec>,
    /// Skip the interactive gate when no GPU is detected (for automated
    /// environments).
    pub assume_yes: bool,
    pub client: Client,
    /// Bootstrap interpreter, filled by the prerequisite step.
    pub python: Option<PathBuf>,
    pub gpu: GpuCapability,
    pub dependencies: Vec<DependencyRecord>,
}

impl ProvisionContext {
    /// Build a context for a layout, resuming whatever an earlier run
    /// already persisted (GPU capability, dependency records, and the
    /// model variant when none is requested).
    pub fn new(layout: InstallLayout, quant: Option<Quantization>, assume_yes: bool) -> Self {
        let marker = EnvironmentMarker::load(&layout);
        let quant = quant.unwrap_or(marker.quantization);
        let catalog = artifacts::catalog(quant);
        Self {
            layout,
            quant,
            catalog,
            assume_yes,
            client: Client::new(),
            python: None,
            gpu: marker.gpu,
            dependencies: marker.dependencies,
        }
    }
}

/// One provisioning step.
///
/// `is_satisfied` must be purely state-derived: it is called both to
/// skip the step and (by tests) to verify its effect.
#[async_trait]
pub trait ProvisionStep: Send + Sync {
    fn name(&self) -> String;
    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool;
    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError>;
}

/// How one step concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Target condition already held; nothing was done.
    Skipped,
    Completed,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
}

/// Outcome of a full provisioning run.
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub steps: Vec<StepReport>,
}

impl ProvisionReport {
    pub fn skipped(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .count()
    }
}

/// A step failure, naming the step so the caller can report exactly
/// where the sequence halted.
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: ProvisionError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.error)
    }
}

impl std::error::Error for StepFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Build the ordered step sequence for a context.
pub fn step_sequence(ctx: &ProvisionContext) -> Vec<Box<dyn ProvisionStep>> {
    let mut steps: Vec<Box<dyn ProvisionStep>> = vec![
        Box::new(CheckInterpreter),
        Box::new(DetectGpu),
        Box::new(CreateDirectories),
        Box::new(CreateRuntime),
        Box::new(InstallPackages),
    ];
    for spec in &ctx.catalog {
        steps.push(Box::new(FetchArtifact { spec: spec.clone() }));
    }
    steps.push(Box::new(WriteLauncher));
    steps
}

/// Run the sequence to completion or the first fatal step.
pub async fn run(ctx: &mut ProvisionContext) -> Result<ProvisionReport, StepFailure> {
    let steps = step_sequence(ctx);
    let mut report = ProvisionReport::default();

    for step in steps {
        let name = step.name();
        if step.is_satisfied(ctx) {
            info!(step = %name, "already satisfied, skipping");
            println!("✓ {name} (already satisfied)");
            report.steps.push(StepReport {
                name,
                status: StepStatus::Skipped,
            });
            continue;
        }

        println!("→ {name}...");
        match step.run(ctx).await {
            Ok(()) => {
                println!("✓ {name}");
                report.steps.push(StepReport {
                    name,
                    status: StepStatus::Completed,
                });
            }
            Err(error) => return Err(StepFailure { step: name, error }),
        }
    }

    Ok(report)
}

// ============================================================================
// Steps
// ============================================================================

struct CheckInterpreter;

#[async_trait]
impl ProvisionStep for CheckInterpreter {
    fn name(&self) -> String {
        "check interpreter".to_string()
    }

    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool {
        ctx.python.is_some()
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        let python = interpreter::find_python()?;
        info!(python = %python.display(), "interpreter found");
        ctx.python = Some(python);
        Ok(())
    }
}

struct DetectGpu;

#[async_trait]
impl ProvisionStep for DetectGpu {
    fn name(&self) -> String {
        "detect GPU".to_string()
    }

    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool {
        // A capability persisted by an earlier run is trusted; only
        // Unknown forces a fresh probe.
        ctx.gpu != GpuCapability::Unknown
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        ctx.gpu = gpu::detect();

        match &ctx.gpu {
            GpuCapability::Detected {
                name,
                vram_bytes,
                driver_version,
            } => {
                println!(
                    "  GPU: {name} ({:.1} GB VRAM, driver {driver_version})",
                    *vram_bytes as f64 / 1024f64.powi(3)
                );
                Ok(())
            }
            _ => {
                println!();
                println!("⚠️  No NVIDIA GPU detected.");
                println!("   Generation will run on the CPU, which is much slower.");
                println!("   If you believe a GPU is present, check your driver install.");
                println!();
                if ctx.assume_yes || confirm("Continue with CPU-only generation? [y/N] ")? {
                    Ok(())
                } else {
                    Err(ProvisionError::CapabilityDeclined)
                }
            }
        }
    }
}

fn confirm(prompt: &str) -> Result<bool, ProvisionError> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = input.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

struct CreateDirectories;

#[async_trait]
impl ProvisionStep for CreateDirectories {
    fn name(&self) -> String {
        "create directories".to_string()
    }

    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool {
        [
            &ctx.layout.root,
            &ctx.layout.runtime_dir,
            &ctx.layout.models_dir,
            &ctx.layout.bin_dir,
        ]
        .iter()
        .all(|dir| dir.is_dir())
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        for dir in [
            &ctx.layout.root,
            &ctx.layout.runtime_dir,
            &ctx.layout.models_dir,
            &ctx.layout.bin_dir,
        ] {
            ensure_directory(dir)?;
        }
        Ok(())
    }
}

struct CreateRuntime;

#[async_trait]
impl ProvisionStep for CreateRuntime {
    fn name(&self) -> String {
        "create isolated runtime".to_string()
    }

    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool {
        ctx.layout.runtime_python().exists()
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        let python = ctx
            .python
            .clone()
            .ok_or_else(|| ProvisionError::RuntimeCreateFailed {
                path: ctx.layout.runtime_dir.clone(),
                reason: "no bootstrap interpreter available".to_string(),
            })?;
        runtime::create_runtime(&ctx.layout, &python).await
    }
}

struct InstallPackages;

#[async_trait]
impl ProvisionStep for InstallPackages {
    fn name(&self) -> String {
        "install runtime packages".to_string()
    }

    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool {
        packages::marker_is_fresh(&ctx.layout, &ctx.gpu)
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        let records = packages::install_packages(&ctx.layout, &ctx.gpu).await?;
        ctx.dependencies = records;
        Ok(())
    }
}

struct FetchArtifact {
    spec: ArtifactSpec,
}

#[async_trait]
impl ProvisionStep for FetchArtifact {
    fn name(&self) -> String {
        format!("fetch {}", self.spec.id)
    }

    fn is_satisfied(&self, ctx: &ProvisionContext) -> bool {
        self.spec.is_present(&ctx.layout)
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        fetch_artifact(&ctx.client, &self.spec, &ctx.layout).await
    }
}

struct WriteLauncher;

#[async_trait]
impl ProvisionStep for WriteLauncher {
    fn name(&self) -> String {
        "write launcher".to_string()
    }

    // Overwritten unconditionally: cheap and deterministic.
    fn is_satisfied(&self, _ctx: &ProvisionContext) -> bool {
        false
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<(), ProvisionError> {
        let exe = env::current_exe().unwrap_or_else(|_| PathBuf::from("zimgen"));
        write_launcher(&ctx.layout, &exe)?;

        let marker = EnvironmentMarker {
            gpu: ctx.gpu.clone(),
            dependencies: ctx.dependencies.clone(),
            quantization: ctx.quant,
            provisioned_at: Some(Utc::now()),
        };
        marker.store(&ctx.layout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use zimgen_core::environment::EnvironmentDescriptor;

    /// Build a context whose every presence check is already satisfied,
    /// without touching the network or a real Python.
    fn satisfied_context() -> (tempfile::TempDir, ProvisionContext) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());
        let gpu = GpuCapability::Detected {
            name: "NVIDIA GeForce RTX 3050".to_string(),
            vram_bytes: 4 * 1024 * 1024 * 1024,
            driver_version: "551.86".to_string(),
        };

        for dir in [&layout.runtime_dir, &layout.models_dir, &layout.bin_dir] {
            fs::create_dir_all(dir).unwrap();
        }

        // Fake venv interpreter.
        let python = layout.runtime_python();
        fs::create_dir_all(python.parent().unwrap()).unwrap();
        fs::write(&python, b"").unwrap();

        // Fake artifacts with tiny thresholds.
        let mut catalog = artifacts::catalog(Quantization::Q4_0);
        for spec in &mut catalog {
            spec.min_bytes = 4;
            let path = spec.path(&layout);
            fs::write(&path, b"artifact payload").unwrap();
        }

        // Fresh package marker.
        let records: Vec<DependencyRecord> = packages::package_catalog(&gpu)
            .iter()
            .map(|p| DependencyRecord {
                package: p.package.clone(),
                installed: true,
                strategy_ordinal: Some(0),
            })
            .collect();
        let marker_json = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "packages": records.iter().map(|r| r.package.clone()).collect::<Vec<_>>(),
        });
        fs::write(
            layout.packages_marker(),
            serde_json::to_string(&marker_json).unwrap(),
        )
        .unwrap();

        let mut ctx = ProvisionContext::new(layout, Some(Quantization::Q4_0), true);
        ctx.catalog = catalog;
        ctx.gpu = gpu;
        ctx.python = Some(PathBuf::from("/usr/bin/python3"));
        ctx.dependencies = records;
        (tmp, ctx)
    }

    #[tokio::test]
    async fn fully_satisfied_rerun_performs_no_work() {
        let (_tmp, mut ctx) = satisfied_context();

        let report = run(&mut ctx).await.unwrap();

        // Everything except the launcher (unconditional rewrite) must be
        // skipped: zero transfers, zero installs.
        let completed: Vec<&str> = report
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(completed, vec!["write launcher"]);
        assert_eq!(report.skipped(), report.steps.len() - 1);
    }

    #[tokio::test]
    async fn undersized_artifact_is_not_satisfied() {
        let (_tmp, mut ctx) = satisfied_context();

        // Truncate one artifact below its threshold and point its URL at
        // a closed local port so the refetch fails fast.
        ctx.catalog[1].url = "http://127.0.0.1:9/unreachable".to_string();
        let spec = ctx.catalog[1].clone();
        fs::write(spec.path(&ctx.layout), b"x").unwrap();

        let steps = step_sequence(&ctx);
        let fetch = steps
            .iter()
            .find(|s| s.name() == format!("fetch {}", spec.id))
            .unwrap();
        assert!(!fetch.is_satisfied(&ctx));

        // The run halts at the unsatisfied fetch (no network here), and
        // the failure names the step.
        let failure = run(&mut ctx).await.unwrap_err();
        assert_eq!(failure.step, format!("fetch {}", spec.id));
        assert!(matches!(
            failure.error,
            ProvisionError::ArtifactDownloadFailed { .. }
        ));
    }

    #[tokio::test]
    async fn launcher_and_descriptor_exist_after_run() {
        let (_tmp, mut ctx) = satisfied_context();

        run(&mut ctx).await.unwrap();

        assert!(ctx.layout.launcher_path.is_file());
        assert!(ctx.layout.descriptor_path.is_file());

        // The descriptor round-trips: a fresh load sees the run's state.
        let env = EnvironmentDescriptor::load(ctx.layout.clone());
        assert!(env.runtime_ready);
        assert_eq!(env.gpu.vram_bytes(), Some(4 * 1024 * 1024 * 1024));
        let marker = EnvironmentMarker::load(&ctx.layout);
        assert_eq!(marker.quantization, Quantization::Q4_0);
        assert!(marker.provisioned_at.is_some());
    }

    #[test]
    fn omitted_variant_resumes_the_one_a_previous_run_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());
        fs::create_dir_all(&layout.root).unwrap();
        EnvironmentMarker {
            quantization: Quantization::Q8_0,
            ..EnvironmentMarker::default()
        }
        .store(&layout)
        .unwrap();

        let resumed = ProvisionContext::new(layout.clone(), None, true);
        assert_eq!(resumed.quant, Quantization::Q8_0);

        // An explicit request still wins over the recorded variant.
        let overridden = ProvisionContext::new(layout, Some(Quantization::Q5_0), true);
        assert_eq!(overridden.quant, Quantization::Q5_0);
    }

    #[test]
    fn sequence_order_matches_the_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ProvisionContext::new(
            InstallLayout::at(tmp.path().to_path_buf()),
            Some(Quantization::Q4_0),
            true,
        );
        let names: Vec<String> = step_sequence(&ctx).iter().map(|s| s.name()).collect();

        assert_eq!(names[0], "check interpreter");
        assert_eq!(names[1], "detect GPU");
        assert_eq!(names[2], "create directories");
        assert_eq!(names[3], "create isolated runtime");
        assert_eq!(names[4], "install runtime packages");
        assert!(names[5..9].iter().all(|n| n.starts_with("fetch ")));
        assert_eq!(names[9], "write launcher");
        assert_eq!(names.len(), 10);
    }
}
