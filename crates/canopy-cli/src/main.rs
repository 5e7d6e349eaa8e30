//! canopy CLI - Build Python canisters for the Internet Computer.

mod build;
mod colors;

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

use build::{BuildRequest, Outcome};

const USAGE: &str = "Usage: canopy [-v|--verbose] <canister_name> <entry_point> <did_path>";

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Build Python canisters for the Internet Computer")]
#[command(version)]
struct Cli {
    /// Stream tool output and enable debug logging
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// <canister_name> <entry_point> <did_path>
    #[arg(value_name = "ARGS")]
    positional: Vec<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return argument_error(&err),
    };
    let verbose = cli.verbose > 0;

    // Initialize logging
    let filter = if verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let [canister_name, entry_point, did_path] = cli.positional.as_slice() else {
        if cli.positional.is_empty() {
            println!("\ncanopy {}", canopy_core::VERSION);
            println!("\n{USAGE}");
            return ExitCode::SUCCESS;
        }
        eprintln!(
            "{}",
            colors::paint(colors::RED, "\n💣 wrong number of arguments\n")
        );
        eprintln!("{USAGE}");
        eprintln!("\n💀 Build failed");
        return ExitCode::FAILURE;
    };

    let request = BuildRequest {
        canister_name,
        entry_point,
        did_path,
    };

    match build::execute(&request, verbose) {
        Ok(Outcome::Built) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{}", colors::paint(colors::RED, format!("\n💣 {err:#}\n")));
            eprintln!("💀 Build failed");
            ExitCode::FAILURE
        }
    }
}

/// Help and version requests succeed; every other parse error is a usage
/// failure with exit code 1.
fn argument_error(err: &clap::Error) -> ExitCode {
    if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        print!("{err}");
        return ExitCode::SUCCESS;
    }

    let message = err.to_string();
    let headline = message.lines().next().unwrap_or("invalid arguments");
    eprintln!("{}", colors::paint(colors::RED, format!("\n💣 {headline}\n")));
    eprintln!("{USAGE}");
    eprintln!("\n💀 Build failed");
    ExitCode::FAILURE
}
