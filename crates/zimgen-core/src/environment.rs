//! The Environment Descriptor: what the invoker trusts about the install.
//!
//! Most of the descriptor is derived from the filesystem at load time
//! (runtime presence, artifact presence). Facts that cannot be derived
//! from files - the detected GPU capability and which install strategy
//! each package needed - are persisted by the provisioner in a small JSON
//! marker (`environment.json`) and read back here. The descriptor is
//! loaded fresh at the start of every invoker run and never cached
//! across runs.

use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifacts::{self, ArtifactId, ArtifactSpec, Quantization};
use crate::paths::{InstallLayout, PathError, ensure_parent_dir};

/// Detected GPU capability.
///
/// Advisory: it degrades generation defaults but never blocks
/// provisioning outright.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum GpuCapability {
    /// An NVIDIA GPU was found.
    Detected {
        name: String,
        vram_bytes: u64,
        driver_version: String,
    },
    /// Detection ran and found nothing.
    NotDetected,
    /// Detection never ran (or the marker predates it).
    #[default]
    Unknown,
}

impl GpuCapability {
    /// VRAM in bytes when known.
    pub fn vram_bytes(&self) -> Option<u64> {
        match self {
            Self::Detected { vram_bytes, .. } => Some(*vram_bytes),
            _ => None,
        }
    }
}

/// Which fallback strategy installed a package. Diagnostics only; never
/// re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub package: String,
    pub installed: bool,
    /// Ordinal of the strategy that succeeded (0 = first attempted).
    pub strategy_ordinal: Option<usize>,
}

/// Persisted half of the descriptor, written by the provisioner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentMarker {
    #[serde(default)]
    pub gpu: GpuCapability,
    #[serde(default)]
    pub dependencies: Vec<DependencyRecord>,
    #[serde(default)]
    pub quantization: Quantization,
    pub provisioned_at: Option<DateTime<Utc>>,
}

impl EnvironmentMarker {
    /// Read the marker, returning defaults when it is missing or
    /// unparseable (an older or damaged marker degrades to `Unknown`,
    /// it never fails the load).
    pub fn load(layout: &InstallLayout) -> Self {
        let Ok(content) = fs::read_to_string(&layout.descriptor_path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Persist the marker at the layout's descriptor path.
    pub fn store(&self, layout: &InstallLayout) -> Result<(), PathError> {
        ensure_parent_dir(&layout.descriptor_path)?;
        let content = serde_json::to_string_pretty(self).expect("marker serializes");
        fs::write(&layout.descriptor_path, content).map_err(|e| PathError::NotWritable {
            path: layout.descriptor_path.clone(),
            reason: e.to_string(),
        })
    }
}

/// Presence of one artifact at load time.
#[derive(Debug, Clone)]
pub struct ArtifactStatus {
    pub spec: ArtifactSpec,
    pub present: bool,
}

/// The full descriptor the invoker reads at the start of each run.
#[derive(Debug, Clone)]
pub struct EnvironmentDescriptor {
    pub layout: InstallLayout,
    /// True once the isolated runtime's interpreter exists.
    pub runtime_ready: bool,
    pub gpu: GpuCapability,
    pub artifacts: Vec<ArtifactStatus>,
    pub dependencies: Vec<DependencyRecord>,
}

impl EnvironmentDescriptor {
    /// Load the descriptor for a layout, checking artifact presence for
    /// the marker's recorded quantization (or the default when no marker
    /// exists yet).
    pub fn load(layout: InstallLayout) -> Self {
        let marker = EnvironmentMarker::load(&layout);
        Self::load_with_quant(layout, marker)
    }

    fn load_with_quant(layout: InstallLayout, marker: EnvironmentMarker) -> Self {
        let runtime_ready = layout.runtime_python().exists();
        let artifacts = artifacts::catalog(marker.quantization)
            .into_iter()
            .map(|spec| {
                let present = spec.is_present(&layout);
                ArtifactStatus { spec, present }
            })
            .collect();

        Self {
            layout,
            runtime_ready,
            gpu: marker.gpu,
            artifacts,
            dependencies: marker.dependencies,
        }
    }

    /// Artifacts currently failing their presence check.
    pub fn missing_artifacts(&self) -> Vec<ArtifactId> {
        self.artifacts
            .iter()
            .filter(|status| !status.present)
            .map(|status| status.spec.id)
            .collect()
    }

    /// Ready = runtime present and every required artifact present.
    pub fn is_ready(&self) -> bool {
        self.runtime_ready && self.artifacts.iter().all(|status| status.present)
    }

    /// Path of an artifact's final file.
    pub fn artifact_path(&self, id: ArtifactId) -> Option<std::path::PathBuf> {
        self.artifacts
            .iter()
            .find(|status| status.spec.id == id)
            .map(|status| status.spec.path(&self.layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_layout() -> (tempfile::TempDir, InstallLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());
        (tmp, layout)
    }

    #[test]
    fn empty_root_is_not_ready() {
        let (_tmp, layout) = temp_layout();
        let env = EnvironmentDescriptor::load(layout);

        assert!(!env.runtime_ready);
        assert!(!env.is_ready());
        assert_eq!(env.missing_artifacts().len(), 4);
        assert_eq!(env.gpu, GpuCapability::Unknown);
    }

    #[test]
    fn runtime_ready_when_interpreter_exists() {
        let (_tmp, layout) = temp_layout();
        let python = layout.runtime_python();
        fs::create_dir_all(python.parent().unwrap()).unwrap();
        fs::write(&python, b"").unwrap();

        let env = EnvironmentDescriptor::load(layout);
        assert!(env.runtime_ready);
        // Artifacts still missing, so the whole environment is not ready.
        assert!(!env.is_ready());
    }

    #[test]
    fn marker_round_trips_gpu_and_dependencies() {
        let (_tmp, layout) = temp_layout();
        let marker = EnvironmentMarker {
            gpu: GpuCapability::Detected {
                name: "NVIDIA GeForce RTX 3050".to_string(),
                vram_bytes: 4 * 1024 * 1024 * 1024,
                driver_version: "551.86".to_string(),
            },
            dependencies: vec![DependencyRecord {
                package: "stable-diffusion-cpp-python".to_string(),
                installed: true,
                strategy_ordinal: Some(1),
            }],
            quantization: Quantization::Q5_0,
            provisioned_at: Some(Utc::now()),
        };
        marker.store(&layout).unwrap();

        let env = EnvironmentDescriptor::load(layout);
        assert_eq!(env.gpu.vram_bytes(), Some(4 * 1024 * 1024 * 1024));
        assert_eq!(env.dependencies.len(), 1);
        assert_eq!(env.dependencies[0].strategy_ordinal, Some(1));
        // Q5_0 marker means presence is checked against the Q5_0 file.
        assert!(env.artifacts[0].spec.file_name.contains("Q5_0"));
    }

    #[test]
    fn damaged_marker_degrades_to_defaults() {
        let (_tmp, layout) = temp_layout();
        fs::create_dir_all(&layout.root).unwrap();
        fs::write(&layout.descriptor_path, b"{not json").unwrap();

        let env = EnvironmentDescriptor::load(layout);
        assert_eq!(env.gpu, GpuCapability::Unknown);
    }

    #[test]
    fn artifact_path_matches_spec_destination() {
        let layout = InstallLayout::at(PathBuf::from("/r"));
        let env = EnvironmentDescriptor::load_with_quant(layout, EnvironmentMarker::default());
        let path = env.artifact_path(ArtifactId::EngineBinary).unwrap();
        assert!(path.starts_with("/r/bin"));
    }
}
