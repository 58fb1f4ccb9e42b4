use clap::Parser;
use calpresence_core::error::CoreError;
use owo_colors::{OwoColorize, Style};
use snapshot::SnapshotError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod parser;
mod snapshot;
mod timezone;
mod util;
mod views;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    let config = config::Config::new().unwrap_or_else(|e| {
        eprintln!("{} {}", "Warning: ignoring config:".yellow(), e);
        config::Config::default()
    });
    init_tracing(&config, cli.json_logs);

    let result = match cli.command {
        cli::Commands::Decode(command) => commands::decode::decode_command(command, &config).await,
        cli::Commands::Preview(command) => {
            commands::preview::preview_command(command, &config).await
        }
        cli::Commands::Timezones(command) => {
            commands::timezones::timezones_command(command, &config).await
        }
        cli::Commands::Watch(command) => commands::watch::watch_command(command, &config).await,
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

fn init_tracing(config: &config::Config, json_flag: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let registry = tracing_subscriber::registry().with(filter);
    if json_flag || config.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidTimezone(s) => {
                eprintln!("{} Invalid time zone: {}", "Error:".style(error_style), s.yellow());
            }
            CoreError::Pattern(e) => {
                eprintln!("{} Recurrence blob rejected: {}", "Error:".style(error_style), e);
                eprintln!("The item would be tracked as a one-off meeting.");
            }
            CoreError::Hex(e) => {
                eprintln!("{} Blob is not valid hex: {}", "Error:".style(error_style), e);
            }
            _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
        }
    } else if let Some(snapshot_error) = err.downcast_ref::<SnapshotError>() {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
        if matches!(snapshot_error, SnapshotError::Json(_)) {
            eprintln!("Snapshot files are JSON objects with `items` and `changes` arrays.");
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
