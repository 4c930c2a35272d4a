//! CLI entry point and mode dispatch.
//!
//! Exit codes are part of the contract: 0 for success, 1 for any
//! failure (including --check reporting a not-ready environment).

use std::process::ExitCode;

use anyhow::bail;
use clap::{CommandFactory, Parser};

use zimgen_cli::handlers;
use zimgen_cli::parser::Cli;
use zimgen_core::paths::InstallLayout;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("✗ {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    tracing::debug!(?cli, "dispatching");
    if cli.install {
        return handlers::install::handle_install(cli).await;
    }
    if cli.check {
        let ready = handlers::check::handle_check()?;
        if !ready {
            bail!("environment is not ready");
        }
        return Ok(());
    }
    if cli.smoke_test {
        return handlers::install::run_smoke_test(InstallLayout::resolve()?).await;
    }
    if cli.interactive {
        return handlers::interactive::handle_interactive(cli).await;
    }
    if let Some(prompt) = &cli.prompt {
        return handlers::generate::handle_generate(cli, prompt).await;
    }

    Cli::command().print_help()?;
    println!();
    bail!("a prompt or a mode flag is required")
}
