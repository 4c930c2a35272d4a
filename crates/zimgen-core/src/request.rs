//! Generation requests: one per invoker run, ephemeral.
//!
//! A request never mutates the Environment Descriptor; resolution only
//! fills in defaults, draws a seed when none was given and computes the
//! output path. Explicit user values are never replaced with computed
//! ones.

use std::path::PathBuf;

use chrono::Local;
use serde::Serialize;
use thiserror::Error;

use crate::settings::GenerationDefaults;

/// Validation errors for a generation request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// An empty prompt is a usage error, never silently defaulted.
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Width and height must be positive (got {width}x{height})")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Steps must be positive")]
    InvalidSteps,
}

/// A raw generation request as parsed from the CLI.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    /// Explicit seed; absent means "draw one and report it".
    pub seed: Option<u64>,
    /// Explicit output path; absent means the downloads directory with a
    /// generated `image_{seed}_{timestamp}.png` name.
    pub output: Option<PathBuf>,
}

/// A fully resolved request, ready to be turned into an engine call.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    /// The seed actually used. Always concrete so the caller can echo it.
    pub seed: u64,
    /// True when the seed was drawn rather than supplied.
    pub seed_was_drawn: bool,
    pub output_path: PathBuf,
}

impl GenerationRequest {
    /// Validate the request without resolving anything.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        let width = self.width.unwrap_or(1);
        let height = self.height.unwrap_or(1);
        if width == 0 || height == 0 {
            return Err(RequestError::InvalidDimensions { width, height });
        }
        if self.steps == Some(0) {
            return Err(RequestError::InvalidSteps);
        }
        Ok(())
    }

    /// Resolve the request against defaults and a default output
    /// directory. Explicit values always win; the seed is drawn fresh
    /// when absent.
    pub fn resolve(
        &self,
        defaults: &GenerationDefaults,
        default_output_dir: &std::path::Path,
    ) -> Result<ResolvedRequest, RequestError> {
        self.validate()?;

        let (seed, seed_was_drawn) = match self.seed {
            Some(seed) => (seed, false),
            None => (rand::random::<u64>(), true),
        };

        let output_path = match &self.output {
            Some(path) => path.clone(),
            None => default_output_dir.join(default_file_name(seed)),
        };

        Ok(ResolvedRequest {
            prompt: self.prompt.trim().to_string(),
            negative_prompt: self.negative_prompt.clone().unwrap_or_default(),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            steps: self.steps.unwrap_or(defaults.steps),
            seed,
            seed_was_drawn,
            output_path,
        })
    }
}

/// Default output file name. The seed is embedded so a previous result
/// can be identified and reproduced without consulting logs.
fn default_file_name(seed: u64) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("image_{seed}_{timestamp}.png")
}
