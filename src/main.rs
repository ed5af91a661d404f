mod cli;
mod dry_run;
mod scratch_bar;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use tracing::{info, Level};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = Cli::parse();

    LogTracer::init().context("Failed to redirect log records to tracing")?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    info!("Emulating PCI function {}", args.sbdf);

    dry_run::run(&args)
}
