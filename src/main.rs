use clap::Parser;

use hotcmd::Settings;
use hotcmd::cli::commands;
use hotcmd::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Init runs before any configuration exists
    if let Commands::Init { force } = cli.command {
        commands::init::run_init(force);
        return;
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    hotcmd::logging::init_with_config(&settings.logging);

    let code = match cli.command {
        Commands::Init { .. } => 0,
        Commands::Config => {
            commands::init::run_config(&settings);
            0
        }
        Commands::List { json, units } => {
            commands::list::run(&settings, &units, json);
            0
        }
        Commands::Run { no_watch, units } => commands::run::run(&settings, &units, no_watch).await,
    };

    // Handlers still running on the blocking pool are not waited for
    std::process::exit(code);
}
