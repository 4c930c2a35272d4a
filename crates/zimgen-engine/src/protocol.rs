//! Wire protocol between the Python driver and the bridge.
//!
//! The driver writes one JSON object per stdout line. Each line maps
//! 1:1 to an `EngineEvent` variant.
//!
//! # Protocol Schema
//!
//! All messages are JSON objects with a required `status` field:
//!
//! ```json
//! {"status": "loading"}
//! {"status": "loaded", "elapsed_ms": 4210}
//! {"status": "progress", "step": 2, "total": 4}
//! {"status": "done", "path": "/home/u/Downloads/image_42_20260829_101500.png", "elapsed_ms": 9120}
//! {"status": "error", "kind": "oom", "message": "CUDA out of memory"}
//! ```
//!
//! Error kinds: `oom` (memory exhaustion), `missing-engine` (the binding
//! or its accelerated library could not be loaded), `engine` (anything
//! else).

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when parsing protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing or invalid 'status' field")]
    InvalidStatus,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),
}

/// Classification of a driver-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Memory exhaustion (host or device).
    Oom,
    /// The engine binding or its accelerated library failed to load.
    MissingEngine,
    /// Any other engine failure.
    Engine,
}

impl EngineErrorKind {
    fn parse(kind: Option<&str>) -> Self {
        match kind {
            Some("oom") => Self::Oom,
            Some("missing-engine") => Self::MissingEngine,
            _ => Self::Engine,
        }
    }
}

/// Events emitted by the driver script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Model loading has started.
    Loading,

    /// All model components are in memory.
    Loaded {
        /// Load time, when the driver measured it.
        elapsed_ms: Option<u64>,
    },

    /// One denoising step finished.
    Progress { step: u32, total: u32 },

    /// The image was written.
    Done {
        path: String,
        elapsed_ms: Option<u64>,
    },

    /// The driver failed.
    Error {
        kind: EngineErrorKind,
        message: String,
    },
}

/// Raw JSON envelope for parsing.
#[derive(Deserialize)]
struct RawEnvelope {
    status: Option<String>,
    // Progress fields
    step: Option<u32>,
    total: Option<u32>,
    // Done fields
    path: Option<String>,
    elapsed_ms: Option<u64>,
    // Error fields
    kind: Option<String>,
    message: Option<String>,
    detail: Option<String>,
}

/// Parse a single driver stdout line into an `EngineEvent`.
pub fn parse_line(line: &str) -> Result<EngineEvent, ProtocolError> {
    let envelope: RawEnvelope = serde_json::from_str(line)?;

    let status = envelope.status.ok_or(ProtocolError::InvalidStatus)?;

    match status.as_str() {
        "loading" => Ok(EngineEvent::Loading),

        "loaded" => Ok(EngineEvent::Loaded {
            elapsed_ms: envelope.elapsed_ms,
        }),

        "progress" => {
            let step = envelope.step.ok_or(ProtocolError::MissingField("step"))?;
            let total = envelope.total.ok_or(ProtocolError::MissingField("total"))?;
            Ok(EngineEvent::Progress { step, total })
        }

        "done" => {
            let path = envelope.path.ok_or(ProtocolError::MissingField("path"))?;
            Ok(EngineEvent::Done {
                path,
                elapsed_ms: envelope.elapsed_ms,
            })
        }

        "error" => {
            let message = envelope
                .message
                .or(envelope.detail)
                .ok_or(ProtocolError::MissingField("message"))?;
            Ok(EngineEvent::Error {
                kind: EngineErrorKind::parse(envelope.kind.as_deref()),
                message,
            })
        }

        other => Err(ProtocolError::UnknownStatus(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loading() {
        let event = parse_line(r#"{"status": "loading"}"#).unwrap();
        assert_eq!(event, EngineEvent::Loading);
    }

    #[test]
    fn test_parse_loaded_with_elapsed() {
        let event = parse_line(r#"{"status": "loaded", "elapsed_ms": 4210}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::Loaded {
                elapsed_ms: Some(4210)
            }
        );
    }

    #[test]
    fn test_parse_loaded_without_elapsed() {
        let event = parse_line(r#"{"status": "loaded"}"#).unwrap();
        assert_eq!(event, EngineEvent::Loaded { elapsed_ms: None });
    }

    #[test]
    fn test_parse_progress() {
        let event = parse_line(r#"{"status": "progress", "step": 2, "total": 4}"#).unwrap();
        assert_eq!(event, EngineEvent::Progress { step: 2, total: 4 });
    }

    #[test]
    fn test_parse_progress_missing_step() {
        let err = parse_line(r#"{"status": "progress", "total": 4}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("step")));
    }

    #[test]
    fn test_parse_progress_missing_total() {
        let err = parse_line(r#"{"status": "progress", "step": 1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("total")));
    }

    #[test]
    fn test_parse_done() {
        let line = r#"{"status": "done", "path": "/tmp/out.png", "elapsed_ms": 9120}"#;
        let event = parse_line(line).unwrap();
        assert_eq!(
            event,
            EngineEvent::Done {
                path: "/tmp/out.png".to_string(),
                elapsed_ms: Some(9120),
            }
        );
    }

    #[test]
    fn test_parse_done_missing_path() {
        let err = parse_line(r#"{"status": "done"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("path")));
    }

    #[test]
    fn test_parse_error_oom() {
        let line = r#"{"status": "error", "kind": "oom", "message": "CUDA out of memory"}"#;
        let event = parse_line(line).unwrap();
        assert_eq!(
            event,
            EngineEvent::Error {
                kind: EngineErrorKind::Oom,
                message: "CUDA out of memory".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_error_missing_engine() {
        let line = r#"{"status": "error", "kind": "missing-engine", "message": "no module named stable_diffusion_cpp"}"#;
        let event = parse_line(line).unwrap();
        assert!(matches!(
            event,
            EngineEvent::Error {
                kind: EngineErrorKind::MissingEngine,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error_unknown_kind_maps_to_engine() {
        let line = r#"{"status": "error", "kind": "weird", "message": "boom"}"#;
        let event = parse_line(line).unwrap();
        assert!(matches!(
            event,
            EngineEvent::Error {
                kind: EngineErrorKind::Engine,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error_without_kind() {
        let event = parse_line(r#"{"status": "error", "message": "boom"}"#).unwrap();
        assert!(matches!(
            event,
            EngineEvent::Error {
                kind: EngineErrorKind::Engine,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error_accepts_detail_field() {
        let event = parse_line(r#"{"status": "error", "detail": "boom"}"#).unwrap();
        assert!(matches!(event, EngineEvent::Error { message, .. } if message == "boom"));
    }

    #[test]
    fn test_parse_error_missing_message() {
        let err = parse_line(r#"{"status": "error", "kind": "oom"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("message")));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_line("loading model...").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn test_parse_missing_status() {
        let err = parse_line(r#"{"step": 1, "total": 4}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStatus));
    }

    #[test]
    fn test_parse_unknown_status() {
        let err = parse_line(r#"{"status": "warming-up"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownStatus(_)));
    }
}
