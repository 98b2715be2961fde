use anyhow::{Result, anyhow};
use clap::Parser;

use crosslink::cli::commands::{index, init, inspect};
use crosslink::cli::{Cli, Commands};
use crosslink::config::Settings;
use crosslink::logging;

fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.map_err(|e| anyhow!("failed to load configuration: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init must work before any configuration exists
    if let Commands::Init { force } = &cli.command {
        logging::init();
        return init::run_init(*force);
    }

    let settings = load_settings(&cli)?;
    logging::init_with_config(&settings.logging);

    match &cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Index { dir, show_failures } => index::run(dir, *show_failures, &settings),
        Commands::Deps { dir, file } => inspect::run_deps(dir, file, &settings),
        Commands::Graph { dir } => inspect::run_graph(dir, &settings),
        Commands::Debug { dir, json } => inspect::run_debug(dir, *json, &settings),
        Commands::Check { dir } => inspect::run_check(dir, &settings),
        Commands::Config => init::run_config(&settings),
    }
}
