//! Isolated runtime creation.
//!
//! The runtime is a plain venv under the install root. It is created
//! only when absent and never recreated over an existing one: recreating
//! would throw away user-installed extras and redo an expensive install.

use std::path::Path;

use tokio::process::Command;
use tracing::info;

use crate::error::ProvisionError;
use zimgen_core::paths::InstallLayout;

/// Create the venv at `runtime/` using the bootstrap interpreter.
pub async fn create_runtime(layout: &InstallLayout, python: &Path) -> Result<(), ProvisionError> {
    info!(path = %layout.runtime_dir.display(), "creating isolated runtime");

    let status = Command::new(python)
        .arg("-m")
        .arg("venv")
        .arg(&layout.runtime_dir)
        .status()
        .await
        .map_err(|e| ProvisionError::RuntimeCreateFailed {
            path: layout.runtime_dir.clone(),
            reason: e.to_string(),
        })?;

    if !status.success() {
        return Err(ProvisionError::RuntimeCreateFailed {
            path: layout.runtime_dir.clone(),
            reason: format!("python -m venv exited with {status}"),
        });
    }

    Ok(())
}

/// Run a command through the runtime's interpreter and report failure as
/// a plain string for the caller's fallback chain.
pub async fn run_runtime_python(
    python: &Path,
    args: &[&str],
    env: &[(String, String)],
) -> Result<(), String> {
    let mut cmd = Command::new(python);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let status = cmd.status().await.map_err(|e| e.to_string())?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("{} {args:?} exited with {status}", python.display()))
    }
}
