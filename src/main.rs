mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::BenchForge::parse();

    // RUST_LOG takes precedence over -v/-q
    let level = LevelFilter::from(args.verbosity);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    commands::handle_commands(&args.config, args.command)
}
