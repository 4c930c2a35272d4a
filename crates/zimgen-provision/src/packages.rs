//! Runtime package installation with explicit fallback chains.
//!
//! Each package carries an ordered list of install strategies with a
//! uniform attempt contract; the chain is iterated until one succeeds
//! and the winning ordinal is recorded for diagnostics. The accelerated
//! strategy always comes first when a GPU was detected: silently
//! installing the slow path when acceleration was available is not an
//! acceptable default.
//!
//! A freshness marker under the runtime records what was installed, so
//! re-runs can skip the step without invoking pip at all.

use std::fs;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use zimgen_core::environment::{DependencyRecord, GpuCapability};
use zimgen_core::paths::InstallLayout;

use crate::error::ProvisionError;
use crate::runtime::run_runtime_python;

/// One way of installing a package.
#[derive(Debug, Clone)]
pub struct InstallStrategy {
    /// Short label for diagnostics ("cuda", "generic").
    pub label: &'static str,
    /// Arguments passed to `python -m pip install`.
    pub pip_args: Vec<String>,
    /// Extra environment for the pip invocation (e.g. CMAKE_ARGS).
    pub env: Vec<(String, String)>,
}

/// A package with its ordered fallback chain.
#[derive(Debug, Clone)]
pub struct PackageInstall {
    pub package: String,
    /// Required packages are fatal when every strategy fails; optional
    /// ones only warn.
    pub required: bool,
    pub strategies: Vec<InstallStrategy>,
}

/// The engine binding, image library and optional console package for
/// the isolated runtime.
pub fn package_catalog(gpu: &GpuCapability) -> Vec<PackageInstall> {
    let mut engine_strategies = Vec::new();

    if matches!(gpu, GpuCapability::Detected { .. }) {
        engine_strategies.push(InstallStrategy {
            label: "cuda",
            pip_args: vec![
                "stable-diffusion-cpp-python".to_string(),
                "--no-cache-dir".to_string(),
                "--force-reinstall".to_string(),
            ],
            env: vec![("CMAKE_ARGS".to_string(), "-DSD_CUDA=ON".to_string())],
        });
    }
    engine_strategies.push(InstallStrategy {
        label: "generic",
        pip_args: vec!["stable-diffusion-cpp-python".to_string()],
        env: Vec::new(),
    });

    vec![
        PackageInstall {
            package: "stable-diffusion-cpp-python".to_string(),
            required: true,
            strategies: engine_strategies,
        },
        PackageInstall {
            package: "pillow".to_string(),
            required: true,
            strategies: vec![InstallStrategy {
                label: "generic",
                pip_args: vec!["pillow".to_string()],
                env: Vec::new(),
            }],
        },
        // Nice-to-have: the driver uses it for readable engine logs in
        // verbose mode. Failure is only a warning.
        PackageInstall {
            package: "rich".to_string(),
            required: false,
            strategies: vec![InstallStrategy {
                label: "generic",
                pip_args: vec!["rich".to_string()],
                env: Vec::new(),
            }],
        },
    ]
}

/// Iterate a package's strategy chain until one attempt succeeds.
///
/// Returns the dependency record (with the winning ordinal) on success.
/// When every strategy fails this is fatal for required packages; for
/// optional packages an `installed: false` record is returned and the
/// caller warns.
pub async fn install_with_fallback<F, Fut>(
    pkg: &PackageInstall,
    attempt: F,
) -> Result<DependencyRecord, ProvisionError>
where
    F: Fn(InstallStrategy) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut failures = Vec::new();

    for (ordinal, strategy) in pkg.strategies.iter().enumerate() {
        info!(package = %pkg.package, strategy = strategy.label, "installing package");
        match attempt(strategy.clone()).await {
            Ok(()) => {
                return Ok(DependencyRecord {
                    package: pkg.package.clone(),
                    installed: true,
                    strategy_ordinal: Some(ordinal),
                });
            }
            Err(reason) => {
                warn!(
                    package = %pkg.package,
                    strategy = strategy.label,
                    %reason,
                    "install strategy failed"
                );
                failures.push(format!("{}: {reason}", strategy.label));
            }
        }
    }

    if pkg.required {
        Err(ProvisionError::DependencyInstallFailed {
            package: pkg.package.clone(),
            attempts: failures.join("; "),
        })
    } else {
        Ok(DependencyRecord {
            package: pkg.package.clone(),
            installed: false,
            strategy_ordinal: None,
        })
    }
}

/// Install every catalog package into the runtime, upgrading pip first.
pub async fn install_packages(
    layout: &InstallLayout,
    gpu: &GpuCapability,
) -> Result<Vec<DependencyRecord>, ProvisionError> {
    let python = layout.runtime_python();

    // A stale pip routinely breaks source builds of the engine binding.
    if let Err(reason) =
        run_runtime_python(&python, &["-m", "pip", "install", "--upgrade", "pip"], &[]).await
    {
        warn!(%reason, "pip self-upgrade failed, continuing with the bundled version");
    }

    let mut records = Vec::new();
    for pkg in package_catalog(gpu) {
        let python = python.clone();
        let record = install_with_fallback(&pkg, |strategy| {
            let python = python.clone();
            async move {
                let mut args = vec!["-m".to_string(), "pip".to_string(), "install".to_string()];
                args.extend(strategy.pip_args.iter().cloned());
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                run_runtime_python(&python, &arg_refs, &strategy.env).await
            }
        })
        .await?;

        if !record.installed {
            println!(
                "⚠️  Optional package '{}' could not be installed; continuing without it.",
                record.package
            );
        }
        records.push(record);
    }

    write_marker(layout, &records)?;
    Ok(records)
}

// ============================================================================
// Freshness marker
// ============================================================================

const MARKER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker file recording what the package step installed.
#[derive(Debug, Serialize, Deserialize)]
struct PackagesMarker {
    version: String,
    packages: Vec<String>,
}

impl PackagesMarker {
    fn current(records: &[DependencyRecord]) -> Self {
        Self {
            version: MARKER_VERSION.to_string(),
            packages: records
                .iter()
                .filter(|r| r.installed)
                .map(|r| r.package.clone())
                .collect(),
        }
    }
}

/// Whether the package step is already satisfied.
///
/// Fresh = the marker exists, parses, matches this version and covers
/// every required package of the current catalog.
pub fn marker_is_fresh(layout: &InstallLayout, gpu: &GpuCapability) -> bool {
    let Ok(content) = fs::read_to_string(layout.packages_marker()) else {
        return false;
    };
    let Ok(marker) = serde_json::from_str::<PackagesMarker>(&content) else {
        return false;
    };

    marker.version == MARKER_VERSION
        && package_catalog(gpu)
            .iter()
            .filter(|p| p.required)
            .all(|p| marker.packages.contains(&p.package))
}

fn write_marker(layout: &InstallLayout, records: &[DependencyRecord]) -> Result<(), ProvisionError> {
    let marker = PackagesMarker::current(records);
    let content = serde_json::to_string_pretty(&marker).expect("marker serializes");
    fs::write(layout.packages_marker(), content)?;
    Ok(())
}
