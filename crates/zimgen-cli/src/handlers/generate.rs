//! Generate mode: one request from the command line.

use std::io::{self, Write};

use zimgen_core::paths::InstallLayout;
use zimgen_core::request::GenerationRequest;
use zimgen_core::settings::GenerationDefaults;
use zimgen_engine::EngineEvent;

use crate::parser::Cli;

/// Build a request from parsed arguments.
pub fn build_request(cli: &Cli, prompt: &str) -> GenerationRequest {
    GenerationRequest {
        prompt: prompt.to_string(),
        negative_prompt: cli.negative.clone(),
        width: cli.width,
        height: cli.height,
        steps: cli.steps,
        seed: cli.seed,
        output: cli.output.clone(),
    }
}

pub async fn handle_generate(cli: &Cli, prompt: &str) -> anyhow::Result<()> {
    let layout = InstallLayout::resolve()?;
    let defaults = GenerationDefaults::from_env();
    let request = build_request(cli, prompt);
    run_request(layout, &request, &defaults).await
}

/// Run one resolved request with terminal progress, then echo the
/// reproduction details.
pub async fn run_request(
    layout: InstallLayout,
    request: &GenerationRequest,
    defaults: &GenerationDefaults,
) -> anyhow::Result<()> {
    let report = zimgen_engine::invoke(layout, request, defaults, print_event).await?;

    println!("✓ Saved {}", report.image_path.display());
    if report.seed_was_drawn {
        println!(
            "  seed: {} (drawn; pass --seed {} to reproduce)",
            report.seed, report.seed
        );
    } else {
        println!("  seed: {}", report.seed);
    }
    println!("  took {:.1} s", report.elapsed.as_secs_f64());
    Ok(())
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Loading => println!("Loading model components..."),
        EngineEvent::Loaded { elapsed_ms } => match elapsed_ms {
            Some(ms) => println!("Model loaded in {:.1} s", *ms as f64 / 1000.0),
            None => println!("Model loaded"),
        },
        EngineEvent::Progress { step, total } => {
            print!("\r  step {step}/{total}");
            let _ = io::stdout().flush();
        }
        // Ends the progress line; the result itself is reported by the
        // caller (or the error path).
        EngineEvent::Done { .. } | EngineEvent::Error { .. } => println!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn request_carries_every_flag() {
        let cli = Cli::try_parse_from([
            "zimgen", "-W", "1024", "-H", "576", "-s", "8", "--seed", "42", "-n", "blurry",
            "-o", "/tmp/x.png", "a fox",
        ])
        .unwrap();

        let request = build_request(&cli, cli.prompt.as_deref().unwrap());
        assert_eq!(request.prompt, "a fox");
        assert_eq!(request.negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(request.width, Some(1024));
        assert_eq!(request.height, Some(576));
        assert_eq!(request.steps, Some(8));
        assert_eq!(request.seed, Some(42));
        assert_eq!(request.output, Some(PathBuf::from("/tmp/x.png")));
    }

    #[test]
    fn unset_flags_stay_unset_for_default_resolution() {
        let cli = Cli::try_parse_from(["zimgen", "a fox"]).unwrap();
        let request = build_request(&cli, "a fox");
        assert_eq!(request.width, None);
        assert_eq!(request.seed, None);
        assert_eq!(request.output, None);
    }
}
