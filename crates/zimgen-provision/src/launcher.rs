//! Launcher materialization.
//!
//! The launcher is a small shell entry point that activates the isolated
//! runtime and delegates every argument to the zimgen executable. It is
//! overwritten unconditionally on every provisioning run: regeneration
//! is cheap and deterministic, so it is not idempotency-sensitive.

use std::fs;
use std::path::Path;

use zimgen_core::paths::InstallLayout;

use crate::error::ProvisionError;

/// Write the launcher script for this platform.
pub fn write_launcher(layout: &InstallLayout, zimgen_exe: &Path) -> Result<(), ProvisionError> {
    let content = launcher_script(layout, zimgen_exe);

    fs::write(&layout.launcher_path, content).map_err(|e| ProvisionError::LauncherWriteFailed {
        path: layout.launcher_path.clone(),
        reason: e.to_string(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&layout.launcher_path)
            .map_err(|e| ProvisionError::LauncherWriteFailed {
                path: layout.launcher_path.clone(),
                reason: e.to_string(),
            })?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&layout.launcher_path, perms).map_err(|e| {
            ProvisionError::LauncherWriteFailed {
                path: layout.launcher_path.clone(),
                reason: e.to_string(),
            }
        })?;
    }

    Ok(())
}

#[cfg(windows)]
fn launcher_script(layout: &InstallLayout, zimgen_exe: &Path) -> String {
    format!(
        "@echo off\r\n\
         rem Generated by zimgen --install; rewritten on every provisioning run.\r\n\
         call \"{runtime}\\Scripts\\activate.bat\"\r\n\
         \"{exe}\" %*\r\n",
        runtime = layout.runtime_dir.display(),
        exe = zimgen_exe.display(),
    )
}

#[cfg(not(windows))]
fn launcher_script(layout: &InstallLayout, zimgen_exe: &Path) -> String {
    format!(
        "#!/bin/sh\n\
         # Generated by zimgen --install; rewritten on every provisioning run.\n\
         . \"{runtime}/bin/activate\"\n\
         exec \"{exe}\" \"$@\"\n",
        runtime = layout.runtime_dir.display(),
        exe = zimgen_exe.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn launcher_activates_runtime_and_delegates() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());
        let exe = PathBuf::from("/usr/local/bin/zimgen");

        write_launcher(&layout, &exe).unwrap();

        let content = fs::read_to_string(&layout.launcher_path).unwrap();
        assert!(content.contains("activate"));
        assert!(content.contains("zimgen"));
    }

    #[test]
    fn launcher_is_overwritten_on_rerun() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());

        write_launcher(&layout, Path::new("/old/zimgen")).unwrap();
        write_launcher(&layout, Path::new("/new/zimgen")).unwrap();

        let content = fs::read_to_string(&layout.launcher_path).unwrap();
        assert!(content.contains("/new/zimgen"));
        assert!(!content.contains("/old/zimgen"));
    }

    #[cfg(unix)]
    #[test]
    fn launcher_is_executable_on_unix() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());
        write_launcher(&layout, Path::new("/usr/local/bin/zimgen")).unwrap();

        let mode = fs::metadata(&layout.launcher_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
