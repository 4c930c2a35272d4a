//! Command-line surface.
//!
//! One flat argument set rather than subcommands: the everyday call is
//! `zimgen "a prompt"`, and the provisioning and diagnostic entry points
//! are mode flags on the same command.

use std::path::PathBuf;

use clap::Parser;

use zimgen_core::artifacts::Quantization;

#[derive(Parser, Debug)]
#[command(
    name = "zimgen",
    version,
    about = "Local image generation with Z-Image-Turbo",
    after_help = "EXAMPLES:\n    \
        zimgen --install\n    \
        zimgen \"a lighthouse at dusk, oil painting\"\n    \
        zimgen -W 1024 -H 576 --seed 42 \"a red fox in snow\"\n    \
        zimgen --interactive"
)]
pub struct Cli {
    /// Text prompt describing the image
    pub prompt: Option<String>,

    /// Image width in pixels
    #[arg(short = 'W', long, value_name = "PIXELS")]
    pub width: Option<u32>,

    /// Image height in pixels
    #[arg(short = 'H', long, value_name = "PIXELS")]
    pub height: Option<u32>,

    /// Number of denoising steps
    #[arg(short = 's', long, value_name = "N")]
    pub steps: Option<u32>,

    /// Seed for reproducible output (random when omitted)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Output file path (defaults to the downloads directory)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Negative prompt: what to steer away from
    #[arg(short = 'n', long, value_name = "TEXT")]
    pub negative: Option<String>,

    /// Model quantization variant: q4_0, q5_0 or q8_0
    #[arg(short = 'm', long, value_name = "QUANT", value_parser = parse_quant)]
    pub model: Option<Quantization>,

    /// Provision the environment (idempotent; safe to re-run)
    #[arg(long)]
    pub install: bool,

    /// Report environment readiness and exit
    #[arg(long)]
    pub check: bool,

    /// Interactive prompt loop
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Assume yes on interactive gates (for scripted installs)
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Run a minimal end-to-end generation to verify the install
    #[arg(long)]
    pub smoke_test: bool,

    /// Verbose diagnostic output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn parse_quant(s: &str) -> Result<Quantization, String> {
    Quantization::parse(s).ok_or_else(|| format!("unknown quantization '{s}' (expected q4_0, q5_0 or q8_0)"))
}
