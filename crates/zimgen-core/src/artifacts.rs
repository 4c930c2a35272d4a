//! Artifact catalog: the large binaries generation depends on.
//!
//! Four artifacts are required: the diffusion model, the autoencoder,
//! the text encoder and the engine's accelerated shared library. Each is
//! fetched once and cached under the install root. An artifact counts as
//! present only if its file exists AND its size exceeds the expected
//! minimum - a partial or corrupted download is treated as absent.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::paths::InstallLayout;

/// Diffusion model quantization variants.
///
/// `Q4_0` is the default: the largest variant validated to fit the 4 GB
/// VRAM target profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    #[default]
    Q4_0,
    Q5_0,
    Q8_0,
}

impl Quantization {
    /// Parse a user-supplied variant name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "q4_0" => Some(Self::Q4_0),
            "q5_0" => Some(Self::Q5_0),
            "q8_0" => Some(Self::Q8_0),
            _ => None,
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::Q4_0 => "z_image_turbo-Q4_0.gguf",
            Self::Q5_0 => "z_image_turbo-Q5_0.gguf",
            Self::Q8_0 => "z_image_turbo-Q8_0.gguf",
        }
    }

    // Actual sizes are ~3.95 / 4.87 / 7.06 GB; minimums sit safely below
    // so a finished transfer always passes and a truncated one never does.
    fn min_bytes(self) -> u64 {
        match self {
            Self::Q4_0 => 3_500_000_000,
            Self::Q5_0 => 4_300_000_000,
            Self::Q8_0 => 6_300_000_000,
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Q4_0 => "q4_0",
            Self::Q5_0 => "q5_0",
            Self::Q8_0 => "q8_0",
        };
        write!(f, "{name}")
    }
}

/// Identity of a required artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactId {
    DiffusionModel,
    Autoencoder,
    TextEncoder,
    EngineBinary,
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DiffusionModel => "diffusion-model",
            Self::Autoencoder => "autoencoder",
            Self::TextEncoder => "text-encoder",
            Self::EngineBinary => "engine-binary",
        };
        write!(f, "{name}")
    }
}

/// Where an artifact's final file lives under the install root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactDestination {
    Models,
    Bin,
}

/// How the downloaded payload maps to the final file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The payload IS the artifact file.
    File,
    /// The payload is a zip archive; its binaries and shared libraries
    /// are extracted into the destination directory.
    ZipArchive,
}

/// One entry of the artifact catalog.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub id: ArtifactId,
    /// Final file name inside the destination directory.
    pub file_name: String,
    /// Plain HTTPS GET source.
    pub url: String,
    /// Presence threshold: a smaller file is treated as absent.
    pub min_bytes: u64,
    pub destination: ArtifactDestination,
    pub kind: ArtifactKind,
}

impl ArtifactSpec {
    /// Final path of the artifact under a layout.
    pub fn path(&self, layout: &InstallLayout) -> PathBuf {
        let dir = match self.destination {
            ArtifactDestination::Models => &layout.models_dir,
            ArtifactDestination::Bin => &layout.bin_dir,
        };
        dir.join(&self.file_name)
    }

    /// Size-validated presence check.
    pub fn is_present(&self, layout: &InstallLayout) -> bool {
        let path = self.path(layout);
        match std::fs::metadata(&path) {
            Ok(meta) => meta.is_file() && meta.len() > self.min_bytes,
            Err(_) => false,
        }
    }
}

const HF_ZIMAGE_GGUF: &str = "https://huggingface.co/leejet/Z-Image-Turbo-GGUF/resolve/main";
const HF_ZIMAGE_SUPPORT: &str = "https://huggingface.co/Comfy-Org/z_image_turbo/resolve/main/split_files";

// Pinned engine release. The engine is a moving target upstream; pinning
// keeps provisioning deterministic and re-runs idempotent.
const ENGINE_RELEASE: &str =
    "https://github.com/leejet/stable-diffusion.cpp/releases/download/master-5900ef6";

#[cfg(target_os = "windows")]
const ENGINE_LIB_NAME: &str = "stable-diffusion.dll";
#[cfg(target_os = "macos")]
const ENGINE_LIB_NAME: &str = "libstable-diffusion.dylib";
#[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
const ENGINE_LIB_NAME: &str = "libstable-diffusion.so";

/// Engine archive asset for the current platform.
///
/// Windows and Linux x86_64 get the CUDA 12 build, macOS ARM64 the Metal
/// build. Other platforms fall back to the AVX2 CPU build, which still
/// satisfies the engine contract (the generic wheel's own library is then
/// simply matched, not improved on).
fn engine_asset_name() -> &'static str {
    #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
    {
        "sd-master-5900ef6-bin-win-cuda12-x64.zip"
    }
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    {
        "sd-master-5900ef6-bin-linux-cuda12-x64.zip"
    }
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        "sd-master-5900ef6-bin-macos-arm64.zip"
    }
    #[cfg(not(any(
        all(target_os = "windows", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "macos", target_arch = "aarch64")
    )))]
    {
        "sd-master-5900ef6-bin-avx2-x64.zip"
    }
}

/// Build the catalog of required artifacts for a model variant.
pub fn catalog(quant: Quantization) -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec {
            id: ArtifactId::DiffusionModel,
            file_name: quant.file_name().to_string(),
            url: format!("{HF_ZIMAGE_GGUF}/{}", quant.file_name()),
            min_bytes: quant.min_bytes(),
            destination: ArtifactDestination::Models,
            kind: ArtifactKind::File,
        },
        ArtifactSpec {
            id: ArtifactId::Autoencoder,
            file_name: "z_image_ae.safetensors".to_string(),
            url: format!("{HF_ZIMAGE_SUPPORT}/vae/z_image_ae.safetensors"),
            min_bytes: 150_000_000,
            destination: ArtifactDestination::Models,
            kind: ArtifactKind::File,
        },
        ArtifactSpec {
            id: ArtifactId::TextEncoder,
            file_name: "qwen_3_4b.safetensors".to_string(),
            url: format!("{HF_ZIMAGE_SUPPORT}/text_encoders/qwen_3_4b.safetensors"),
            min_bytes: 1_500_000_000,
            destination: ArtifactDestination::Models,
            kind: ArtifactKind::File,
        },
        ArtifactSpec {
            id: ArtifactId::EngineBinary,
            file_name: ENGINE_LIB_NAME.to_string(),
            url: format!("{ENGINE_RELEASE}/{}", engine_asset_name()),
            min_bytes: 1_000_000,
            destination: ArtifactDestination::Bin,
            kind: ArtifactKind::ZipArchive,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn layout() -> (tempfile::TempDir, InstallLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());
        (tmp, layout)
    }

    #[test]
    fn catalog_has_all_four_artifacts() {
        let specs = catalog(Quantization::default());
        let ids: Vec<ArtifactId> = specs.iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                ArtifactId::DiffusionModel,
                ArtifactId::Autoencoder,
                ArtifactId::TextEncoder,
                ArtifactId::EngineBinary,
            ]
        );
    }

    #[test]
    fn model_artifacts_land_in_models_dir() {
        let layout = InstallLayout::at(PathBuf::from("/r"));
        let specs = catalog(Quantization::Q4_0);
        assert!(specs[0].path(&layout).starts_with("/r/models"));
        assert!(specs[3].path(&layout).starts_with("/r/bin"));
    }

    #[test]
    fn quantization_selects_model_file() {
        let q8 = catalog(Quantization::Q8_0);
        assert!(q8[0].file_name.contains("Q8_0"));
        assert!(q8[0].url.ends_with("z_image_turbo-Q8_0.gguf"));
    }

    #[test]
    fn missing_file_is_absent() {
        let (_tmp, layout) = layout();
        let spec = &catalog(Quantization::Q4_0)[1];
        assert!(!spec.is_present(&layout));
    }

    #[test]
    fn undersized_file_is_treated_as_absent() {
        let (_tmp, layout) = layout();
        let spec = &catalog(Quantization::Q4_0)[1];
        let path = spec.path(&layout);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        // A stub far below min_bytes: looks like a truncated transfer.
        std::fs::write(&path, b"partial").unwrap();

        assert!(!spec.is_present(&layout));
    }

    #[test]
    fn file_above_minimum_is_present() {
        let (_tmp, layout) = layout();
        let spec = ArtifactSpec {
            id: ArtifactId::Autoencoder,
            file_name: "ae.bin".to_string(),
            url: "https://example.invalid/ae.bin".to_string(),
            min_bytes: 4,
            destination: ArtifactDestination::Models,
            kind: ArtifactKind::File,
        };
        let path = spec.path(&layout);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"well over four bytes").unwrap();

        assert!(spec.is_present(&layout));
    }

    #[test]
    fn quantization_parse_round_trips() {
        for q in [Quantization::Q4_0, Quantization::Q5_0, Quantization::Q8_0] {
            assert_eq!(Quantization::parse(&q.to_string()), Some(q));
        }
        assert_eq!(Quantization::parse("q6_k"), None);
    }
}
