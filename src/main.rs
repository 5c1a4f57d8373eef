//! Stow - content-addressed artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stow::cli::args::{ConfigAction, ConfigArgs};
use stow::cli::{Cli, Commands};
use stow::config::{Config, ConfigManager, LogFormat};
use stow::error::StowResult;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> StowResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // `config init` must work even when the existing file does not parse
    let skip_load = matches!(
        cli.command,
        Commands::Config(ConfigArgs {
            action: Some(ConfigAction::Init { .. })
        })
    );
    let mut config = if skip_load {
        Config::default()
    } else {
        config_manager.load()?
    };

    init_logging(cli.verbose, config.general.log_format);
    debug!("Using config file {}", config_manager.path().display());

    // Config commands see the file as written, without command-line overrides
    if let Commands::Config(args) = cli.command {
        return stow::cli::commands::config(args, &config_manager, &config);
    }

    if let Some(dir) = cli.cache_dir {
        config.cache.directory = Some(dir);
    }

    match cli.command {
        Commands::Run(args) => stow::cli::commands::run(args, &config),
        Commands::Exists(args) => stow::cli::commands::exists(args, &config),
        Commands::Path(args) => stow::cli::commands::path(args, &config),
        Commands::Clean(args) => stow::cli::commands::clean(args, &config),
        Commands::Config(_) => unreachable!("Config handled above"),
    }
}

/// 0 = warn, 1 = info, 2+ = debug. Logs go to stderr.
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("stow=warn"),
        1 => EnvFilter::new("stow=info"),
        _ => EnvFilter::new("stow=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
