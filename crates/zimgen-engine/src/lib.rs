//! Generation engine bridge for zimgen.
//!
//! Serves generation requests against a provisioned install: validates
//! and resolves the request, preflights it against the memory budget,
//! drives the engine through the deployed Python driver and reports the
//! result. The driver speaks a line-oriented JSON protocol defined in
//! [`protocol`].

pub mod bridge;
pub mod call;
pub mod error;
pub mod invoker;
pub mod protocol;

pub use bridge::EngineOutcome;
pub use call::EngineCall;
pub use error::{GenerateError, GenerateResult};
pub use invoker::{GenerationReport, invoke};
pub use protocol::{EngineErrorKind, EngineEvent};
