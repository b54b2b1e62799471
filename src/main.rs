// Headless entry point: parse arguments, start the session log, composite.

mod cli;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    layer_merge::logger::init(args.verbose);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "layer-merge starting");

    cli::run(args)
}
