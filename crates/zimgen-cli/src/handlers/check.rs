//! Check mode: readiness report for the current install.

use zimgen_core::environment::{EnvironmentDescriptor, GpuCapability};
use zimgen_core::paths::InstallLayout;

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Print the readiness table. Returns whether the environment can serve
/// a generation request right now.
pub fn handle_check() -> anyhow::Result<bool> {
    let layout = InstallLayout::resolve()?;
    let env = EnvironmentDescriptor::load(layout);

    println!("{BOLD}zimgen environment{RESET}  {}", env.layout.root.display());
    println!("{}", "-".repeat(52));

    print_row("isolated runtime", env.runtime_ready);
    for status in &env.artifacts {
        print_row(&status.spec.id.to_string(), status.present);
    }

    println!();
    print_gpu(&env.gpu);

    if !env.dependencies.is_empty() {
        println!();
        println!("{BOLD}Packages:{RESET}");
        for dep in &env.dependencies {
            match dep.strategy_ordinal {
                Some(0) => println!("  {GREEN}✓{RESET} {}", dep.package),
                Some(n) => println!("  {GREEN}✓{RESET} {} (fallback #{n})", dep.package),
                None => println!("  {YELLOW}○{RESET} {} (not installed)", dep.package),
            }
        }
    }

    println!();
    if env.is_ready() {
        println!("{GREEN}✓ Ready to generate.{RESET}");
    } else {
        println!("{RED}✗ Not ready.{RESET} Run 'zimgen --install' to finish provisioning.");
    }
    Ok(env.is_ready())
}

fn print_row(name: &str, present: bool) {
    let status = if present {
        format!("{GREEN}✓ present{RESET}")
    } else {
        format!("{RED}✗ missing{RESET}")
    };
    println!("  {name:<20} {status}");
}

fn print_gpu(gpu: &GpuCapability) {
    match gpu {
        GpuCapability::Detected {
            name,
            vram_bytes,
            driver_version,
        } => {
            println!(
                "{BOLD}GPU:{RESET} {GREEN}✓{RESET} {name} ({:.1} GB VRAM, driver {driver_version})",
                *vram_bytes as f64 / 1024f64.powi(3)
            );
        }
        GpuCapability::NotDetected => {
            println!("{BOLD}GPU:{RESET} {YELLOW}○ none detected - CPU generation{RESET}");
        }
        GpuCapability::Unknown => {
            println!("{BOLD}GPU:{RESET} {YELLOW}? not probed yet (run 'zimgen --install'){RESET}");
        }
    }
}
