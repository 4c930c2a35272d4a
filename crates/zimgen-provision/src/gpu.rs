//! GPU detection via nvidia-smi.
//!
//! The primary probe relies on `nvidia-smi` being on PATH. When it is
//! not, a handful of known install locations are tried before giving up;
//! drivers frequently install the tool without updating PATH, especially
//! on Windows and under WSL.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;
use zimgen_core::environment::GpuCapability;

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=name,memory.total,driver_version",
    "--format=csv,noheader,nounits",
];

/// Detect GPU capability, probing fallback locations on failure.
pub fn detect() -> GpuCapability {
    for candidate in smi_candidates() {
        match query_smi(&candidate) {
            Some(capability) => return capability,
            None => debug!(candidate = %candidate.display(), "nvidia-smi probe failed"),
        }
    }
    GpuCapability::NotDetected
}

/// Candidate nvidia-smi locations, PATH first.
fn smi_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("nvidia-smi")];

    #[cfg(target_os = "windows")]
    {
        candidates.push(PathBuf::from(r"C:\Windows\System32\nvidia-smi.exe"));
        candidates.push(PathBuf::from(
            r"C:\Program Files\NVIDIA Corporation\NVSMI\nvidia-smi.exe",
        ));
    }

    #[cfg(not(target_os = "windows"))]
    {
        candidates.push(PathBuf::from("/usr/bin/nvidia-smi"));
        candidates.push(PathBuf::from("/usr/local/bin/nvidia-smi"));
        // WSL ships the tool under the lib directory.
        candidates.push(PathBuf::from("/usr/lib/wsl/lib/nvidia-smi"));
    }

    candidates
}

fn query_smi(binary: &std::path::Path) -> Option<GpuCapability> {
    let output = Command::new(binary).args(QUERY_ARGS).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_query_line(stdout.lines().next()?)
}

/// Parse one CSV line of `nvidia-smi --query-gpu` output.
///
/// Format: `NVIDIA GeForce RTX 3050, 4096, 551.86` with memory in MiB.
/// Multiple GPUs report one line each; the first one wins.
fn parse_query_line(line: &str) -> Option<GpuCapability> {
    let mut fields = line.split(',').map(str::trim);
    let name = fields.next()?.to_string();
    let mib: u64 = fields.next()?.parse().ok()?;
    let driver_version = fields.next()?.to_string();

    if name.is_empty() {
        return None;
    }

    Some(GpuCapability::Detected {
        name,
        vram_bytes: mib * 1024 * 1024,
        driver_version,
    })
}
