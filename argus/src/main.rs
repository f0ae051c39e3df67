//! Command line entry point for the Argus metrics pipeline.
//!
//! One binary, two roles:
//!
//!  - `argus agent` samples local metrics and reports them to a collector.
//!  - `argus server` runs the collector: HTTP API plus storage.
//!
//! Configuration merges four sources with descending precedence: command
//! line flags, environment variables, an optional JSON config file, and
//! built-in defaults.

mod cli;
mod setup;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    setup::init_logging();

    let cli = cli::Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        cli::Command::Agent(args) => runtime.block_on(argus_agent::run(args.into_config()?)),
        cli::Command::Server(args) => runtime.block_on(argus_server::run(args.into_config()?)),
    }
}
