//! Interactive mode: a prompt loop sharing one set of size flags.
//!
//! Each line is one generation. A failed generation reports its error
//! and the loop continues; only EOF or an explicit quit ends the
//! session. Seeds are drawn per image unless --seed was given, in which
//! case every image in the session uses it.

use std::io::{self, BufRead, Write};

use zimgen_core::paths::InstallLayout;
use zimgen_core::settings::GenerationDefaults;

use super::generate::{build_request, run_request};
use crate::parser::Cli;

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

pub async fn handle_interactive(cli: &Cli) -> anyhow::Result<()> {
    let layout = InstallLayout::resolve()?;
    let defaults = GenerationDefaults::from_env();

    println!("Interactive mode. Type a prompt per line; 'quit' to leave.");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&prompt.to_ascii_lowercase().as_str()) {
            break;
        }

        let request = build_request(cli, prompt);
        if let Err(error) = run_request(layout.clone(), &request, &defaults).await {
            eprintln!("✗ {error:#}");
        }
    }

    println!("Bye.");
    Ok(())
}
