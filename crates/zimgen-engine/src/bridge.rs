//! Engine subprocess orchestrator.
//!
//! Deploys the embedded driver script into the install root, spawns it
//! through the isolated runtime's interpreter, streams its stdout as
//! protocol events and turns the final state into a result. Stderr is
//! captured separately and only surfaces when the process fails.

use std::fs;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use zimgen_core::paths::InstallLayout;

use crate::call::EngineCall;
use crate::error::GenerateError;
use crate::protocol::{EngineErrorKind, EngineEvent, ProtocolError, parse_line};

/// The driver script shipped inside the binary and deployed on demand.
const DRIVER_SOURCE: &str = include_str!("../scripts/zimgen_driver.py");

/// What a successful engine run reports back.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub image_path: PathBuf,
    /// Engine-side wall time, when the driver measured it.
    pub engine_elapsed_ms: Option<u64>,
}

/// Write the embedded driver to its install path.
///
/// Overwritten on every run so a binary upgrade always brings its own
/// driver along; the script is a few kilobytes.
pub fn deploy_driver(layout: &InstallLayout) -> Result<(), GenerateError> {
    fs::write(&layout.driver_path, DRIVER_SOURCE)?;
    debug!(path = %layout.driver_path.display(), "driver deployed");
    Ok(())
}

/// Run one assembled engine call to completion.
///
/// `on_event` sees every protocol event as it arrives (for progress
/// display); terminal events are additionally turned into the return
/// value here.
pub async fn run_engine<F>(call: &EngineCall, mut on_event: F) -> Result<EngineOutcome, GenerateError>
where
    F: FnMut(&EngineEvent),
{
    let mut child = Command::new(&call.python)
        .arg(&call.driver)
        .args(call.to_args())
        .env("PYTHONUNBUFFERED", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GenerateError::EngineSpawn(e.to_string()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GenerateError::EngineSpawn("missing stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| GenerateError::EngineSpawn("missing stderr".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr);
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_reader.read_to_end(&mut buf).await;
        buf
    });

    let mut outcome = None;
    let mut reported_error = None;

    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| GenerateError::GenerationFailed(e.to_string()))?
    {
        if line.trim().is_empty() {
            continue;
        }

        match interpret_line(&line) {
            DriverLine::Event(event) => {
                on_event(&event);
                match event {
                    EngineEvent::Done { path, elapsed_ms } => {
                        outcome = Some(EngineOutcome {
                            image_path: PathBuf::from(path),
                            engine_elapsed_ms: elapsed_ms,
                        });
                    }
                    EngineEvent::Error { kind, message } => {
                        reported_error = Some(classify_failure(kind, &message));
                    }
                    _ => {}
                }
            }
            DriverLine::Log => debug!(%line, "engine output"),
            DriverLine::Violation(reason) => {
                let _ = child.kill().await;
                return Err(GenerateError::EngineProtocol(format!("{reason}: {line}")));
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| GenerateError::GenerationFailed(e.to_string()))?;

    if let Some(error) = reported_error {
        return Err(error);
    }
    if let Some(outcome) = outcome {
        info!(path = %outcome.image_path.display(), "engine finished");
        return Ok(outcome);
    }

    // No terminal event: the driver died before reporting. Stderr is the
    // only clue left.
    let stderr_buf = stderr_task.await.unwrap_or_default();
    let stderr_text = String::from_utf8_lossy(&stderr_buf).trim().to_string();
    let reason = if stderr_text.is_empty() {
        format!("engine exited with {status} without reporting a result")
    } else {
        stderr_tail(&stderr_text)
    };
    Err(classify_failure(EngineErrorKind::Engine, &reason))
}

/// One classified line of driver stdout.
#[derive(Debug)]
enum DriverLine {
    /// A well-formed protocol event.
    Event(EngineEvent),
    /// Free-form engine output (sd.cpp logs print to stdout); passed
    /// through, never an error.
    Log,
    /// Structurally JSON but outside the protocol contract, which means
    /// the driver and this binary disagree on the schema.
    Violation(String),
}

fn interpret_line(line: &str) -> DriverLine {
    match parse_line(line) {
        Ok(event) => DriverLine::Event(event),
        Err(ProtocolError::InvalidJson(_)) => DriverLine::Log,
        Err(e) => DriverLine::Violation(e.to_string()),
    }
}

/// Map a driver-reported failure onto the error taxonomy.
///
/// The kind is authoritative when the driver set one; the message text
/// is still scanned because allocator failures inside the engine often
/// surface as generic errors with an out-of-memory message.
fn classify_failure(kind: EngineErrorKind, message: &str) -> GenerateError {
    let lowered = message.to_lowercase();
    let looks_oom = lowered.contains("out of memory")
        || lowered.contains("failed to allocate")
        || lowered.contains("cuda error");

    match kind {
        EngineErrorKind::Oom => GenerateError::InsufficientMemory {
            detail: message.to_string(),
            suggestion: "Try a smaller image (e.g. --width 768 --height 512) or fewer steps"
                .to_string(),
        },
        EngineErrorKind::MissingEngine => GenerateError::GenerationFailed(format!(
            "{message}. The engine install looks damaged; run 'zimgen --install' to repair it"
        )),
        EngineErrorKind::Engine if looks_oom => GenerateError::InsufficientMemory {
            detail: message.to_string(),
            suggestion: "Try a smaller image (e.g. --width 768 --height 512) or fewer steps"
                .to_string(),
        },
        EngineErrorKind::Engine => GenerateError::GenerationFailed(message.to_string()),
    }
}

/// Last few stderr lines, which is where Python tracebacks put the
/// actual exception.
fn stderr_tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_source_is_embedded() {
        assert!(DRIVER_SOURCE.contains("--diffusion-model"));
        assert!(DRIVER_SOURCE.contains("\"status\""));
    }

    #[test]
    fn deploy_overwrites_existing_driver() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::at(tmp.path().to_path_buf());

        fs::write(&layout.driver_path, "print('stale')").unwrap();
        deploy_driver(&layout).unwrap();

        let deployed = fs::read_to_string(&layout.driver_path).unwrap();
        assert!(deployed.contains("--diffusion-model"));
    }

    #[test]
    fn json_with_unknown_status_is_a_violation() {
        let classified = interpret_line(r#"{"status": "warming-up"}"#);
        assert!(matches!(classified, DriverLine::Violation(_)));
    }

    #[test]
    fn json_missing_a_required_field_is_a_violation() {
        let classified = interpret_line(r#"{"status": "progress", "step": 2}"#);
        assert!(matches!(classified, DriverLine::Violation(_)));
    }

    #[test]
    fn free_form_engine_output_passes_through() {
        let classified = interpret_line("ggml_cuda_init: found 1 CUDA devices");
        assert!(matches!(classified, DriverLine::Log));
    }

    #[test]
    fn well_formed_event_is_classified_as_event() {
        let classified = interpret_line(r#"{"status": "loading"}"#);
        assert!(matches!(classified, DriverLine::Event(EngineEvent::Loading)));
    }

    #[test]
    fn oom_kind_classifies_as_insufficient_memory() {
        let err = classify_failure(EngineErrorKind::Oom, "CUDA out of memory");
        assert!(matches!(err, GenerateError::InsufficientMemory { .. }));
    }

    #[test]
    fn oom_message_with_generic_kind_classifies_as_insufficient_memory() {
        let err = classify_failure(
            EngineErrorKind::Engine,
            "ggml_backend failed to allocate buffer of 5368709120 bytes",
        );
        assert!(matches!(err, GenerateError::InsufficientMemory { .. }));
    }

    #[test]
    fn missing_engine_mentions_reinstall() {
        let err = classify_failure(
            EngineErrorKind::MissingEngine,
            "No module named 'stable_diffusion_cpp'",
        );
        assert!(err.to_string().contains("--install"));
    }

    #[test]
    fn generic_failure_keeps_the_message() {
        let err = classify_failure(EngineErrorKind::Engine, "sampler diverged");
        assert!(matches!(err, GenerateError::GenerationFailed(m) if m == "sampler diverged"));
    }

    #[test]
    fn stderr_tail_keeps_final_lines() {
        let text = (1..=10)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tail = stderr_tail(&text);
        assert!(tail.starts_with("line 6"));
        assert!(tail.ends_with("line 10"));
    }
}
