//! Streamed artifact downloads with atomic placement.
//!
//! Every transfer streams into a `.part` file next to the final path and
//! is renamed only after the transfer completes without error. A
//! partially written file therefore never occupies a final path, which
//! is what keeps the presence checks trustworthy across interrupted
//! runs.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tracing::info;

use zimgen_core::artifacts::{ArtifactKind, ArtifactSpec};
use zimgen_core::paths::{InstallLayout, ensure_parent_dir};

use crate::error::ProvisionError;

/// Fetch one artifact to its final location.
///
/// Plain files land directly; zip archives (the engine binary bundle)
/// are extracted into the destination directory and the archive itself
/// is discarded.
pub async fn fetch_artifact(
    client: &Client,
    spec: &ArtifactSpec,
    layout: &InstallLayout,
) -> Result<(), ProvisionError> {
    let dest = spec.path(layout);
    ensure_parent_dir(&dest)?;

    let download_err = |reason: String| ProvisionError::ArtifactDownloadFailed {
        artifact: spec.id,
        url: spec.url.clone(),
        dest: dest.clone(),
        reason,
    };

    match spec.kind {
        ArtifactKind::File => {
            let part = part_path(&dest);
            download_to(client, &spec.url, &part)
                .await
                .map_err(|e| download_err(e.to_string()))?;
            fs::rename(&part, &dest).map_err(|e| download_err(e.to_string()))?;
        }
        ArtifactKind::ZipArchive => {
            let archive = dest.with_file_name(format!("{}.zip.part", spec.file_name));
            download_to(client, &spec.url, &archive)
                .await
                .map_err(|e| download_err(e.to_string()))?;

            let result = extract_engine_archive(&archive, dest.parent().unwrap_or(&layout.bin_dir));
            let _ = fs::remove_file(&archive);
            result?;

            if !spec.is_present(layout) {
                return Err(download_err(format!(
                    "archive did not contain {}",
                    spec.file_name
                )));
            }
        }
    }

    info!(artifact = %spec.id, path = %dest.display(), "artifact placed");
    Ok(())
}

/// `<dir>/<name>.part` next to the final path, so the rename is always
/// within one filesystem.
fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.part"))
}

/// Stream a URL into a file with a progress bar.
///
/// Cleans up the partial file on any error.
async fn download_to(client: &Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    let result = download_to_inner(client, url, dest).await;
    if result.is_err() && dest.exists() {
        let _ = fs::remove_file(dest);
    }
    result.with_context(|| format!("GET {url}"))
}

async fn download_to_inner(client: &Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use anyhow::{Context, bail};

    let response = client
        .get(url)
        .header("User-Agent", "zimgen")
        .send()
        .await
        .context("Failed to start download")?;

    if !response.status().is_success() {
        bail!("HTTP {}", response.status());
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap()
            .progress_chars("█▓░"),
    );

    let mut file = File::create(dest).context("Failed to create download file")?;
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk)
            .context("Error writing to download file")?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush().context("Error flushing download file")?;
    pb.finish_and_clear();
    Ok(())
}

/// Extract engine binaries and shared libraries from the release archive.
///
/// Entry paths are flattened: release zips nest binaries under varying
/// prefixes (`build/bin/` on some platforms, root level on Windows), and
/// only the file names matter here. License, header and source entries
/// are skipped. Each entry goes through its own `.part` rename so the
/// atomic-placement rule holds for extraction too.
pub fn extract_engine_archive(archive_path: &Path, bin_dir: &Path) -> Result<(), ProvisionError> {
    let file =
        File::open(archive_path).map_err(|e| ProvisionError::ExtractionFailed(e.to_string()))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ProvisionError::ExtractionFailed(e.to_string()))?;

    fs::create_dir_all(bin_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ProvisionError::ExtractionFailed(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let file_name = match entry_name.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        if file_name.starts_with("LICENSE")
            || file_name.ends_with(".h")
            || file_name.ends_with(".txt")
            || file_name.ends_with(".metal")
        {
            continue;
        }

        let final_path = bin_dir.join(&file_name);
        let part = part_path(&final_path);
        let mut dest_file = File::create(&part)
            .map_err(|e| ProvisionError::ExtractionFailed(format!("{file_name}: {e}")))?;
        io::copy(&mut entry, &mut dest_file)
            .map_err(|e| ProvisionError::ExtractionFailed(format!("{file_name}: {e}")))?;
        drop(dest_file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&part)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&part, perms)?;
        }

        fs::rename(&part, &final_path)
            .map_err(|e| ProvisionError::ExtractionFailed(format!("{file_name}: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_stays_in_the_same_directory() {
        let dest = Path::new("/models/z_image_turbo-Q4_0.gguf");
        let part = part_path(dest);
        assert_eq!(part.parent(), dest.parent());
        assert_eq!(
            part.file_name().unwrap().to_string_lossy(),
            "z_image_turbo-Q4_0.gguf.part"
        );
    }

    #[test]
    fn extraction_flattens_and_filters_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("engine.zip");
        let bin_dir = tmp.path().join("bin");

        // Build a small archive shaped like a release bundle.
        let file = File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("build/bin/libstable-diffusion.so", options)
            .unwrap();
        writer.write_all(b"not a real shared library").unwrap();
        writer.start_file("build/bin/LICENSE", options).unwrap();
        writer.write_all(b"mit").unwrap();
        writer.start_file("include/sd.h", options).unwrap();
        writer.write_all(b"header").unwrap();
        writer.finish().unwrap();

        extract_engine_archive(&archive_path, &bin_dir).unwrap();

        assert!(bin_dir.join("libstable-diffusion.so").is_file());
        assert!(!bin_dir.join("LICENSE").exists());
        assert!(!bin_dir.join("sd.h").exists());
        // No .part leftovers.
        assert!(!bin_dir.join("libstable-diffusion.so.part").exists());
    }

    #[test]
    fn extraction_fails_cleanly_on_garbage_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("broken.zip");
        std::fs::write(&archive_path, b"this is not a zip").unwrap();

        let err = extract_engine_archive(&archive_path, &tmp.path().join("bin")).unwrap_err();
        assert!(matches!(err, ProvisionError::ExtractionFailed(_)));
    }
}
