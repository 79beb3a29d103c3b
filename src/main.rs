// src/main.rs — muse entry point

use clap::Parser;

use muse::cli::{Cli, Commands};
use muse::infra::config::Config;
use muse::infra::{logger, paths};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Respects MUSE_LOG / RUST_LOG; --verbose raises the default
    let quiet = matches!(&cli.command, Commands::Run(args) if args.quiet);
    logger::init_logging(logger::level_for(cli.verbose, quiet));

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    paths::ensure_dirs().await?;

    match &cli.command {
        Commands::Run(args) => muse::cli::run::run_brainstorm(args, &config).await,
        Commands::Presets { action } => muse::cli::presets::run_presets(action, &config).await,
        Commands::History { action } => muse::cli::history::run_history(action).await,
    }
}
