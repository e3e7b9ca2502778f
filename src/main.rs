//! expgraph CLI: validate, format and inspect experiment graph documents.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "expgraph",
    version,
    about = "Load, validate and re-emit tagged-YAML computation graphs and experiments"
)]
struct Cli {
    /// Loader config (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: expgraph::cli::Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EXPGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = expgraph::cli::dispatch(cli.command, cli.config.as_deref()) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
