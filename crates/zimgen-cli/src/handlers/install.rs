//! Install mode: run the provisioner, then verify with a smoke test.

use anyhow::Context;

use zimgen_core::paths::InstallLayout;
use zimgen_core::request::GenerationRequest;
use zimgen_core::settings::GenerationDefaults;
use zimgen_provision::ProvisionContext;

use crate::parser::Cli;

pub async fn handle_install(cli: &Cli) -> anyhow::Result<()> {
    let layout = InstallLayout::resolve()?;

    // Without -m, a re-run keeps the variant the last install recorded.
    let mut ctx = ProvisionContext::new(layout.clone(), cli.model, cli.yes);

    println!("Installing zimgen into {}", layout.root.display());
    println!("Model variant: {}", ctx.quant);
    println!();

    let report = zimgen_provision::run(&mut ctx)
        .await
        .context("installation did not complete")?;

    println!();
    println!(
        "✓ Installation complete ({} steps, {} already satisfied)",
        report.steps.len(),
        report.skipped()
    );

    if cli.smoke_test {
        run_smoke_test(layout).await?;
    }

    println!();
    println!("Generate an image with: zimgen \"a lighthouse at dusk\"");
    Ok(())
}

/// A minimal end-to-end generation against the freshly provisioned
/// install. Small and single-step so it finishes in seconds even on CPU;
/// the output is thrown away, only the round trip matters.
pub async fn run_smoke_test(layout: InstallLayout) -> anyhow::Result<()> {
    println!("→ Verifying the install with a small test generation...");

    let output = layout.root.join("smoke_test.png");
    let request = GenerationRequest {
        prompt: "a red apple on a wooden table".to_string(),
        width: Some(256),
        height: Some(256),
        steps: Some(1),
        seed: Some(7),
        output: Some(output.clone()),
        ..GenerationRequest::default()
    };

    zimgen_engine::invoke(layout, &request, &GenerationDefaults::default(), |_| {})
        .await
        .context("smoke test generation failed")?;
    let _ = std::fs::remove_file(&output);

    println!("✓ Smoke test passed");
    Ok(())
}
