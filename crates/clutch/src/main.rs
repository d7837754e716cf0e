//! Command line front end for interface binding

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "clutch")]
#[command(about = "Bind an application to a network interface without leaking traffic")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List interfaces the application can be bound to
    Interfaces,

    /// Show the binding and the application's state
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Bind the application to an interface, restarting it if running
    Bind {
        /// Interface name, e.g. en1 or utun3
        name: String,
    },

    /// Remove the binding, restarting the application if running
    Unbind,

    /// Restart the application with its current binding
    Restart,

    /// Choose whether restarts ask the application to quit first
    Graceful {
        /// New setting
        #[arg(value_enum)]
        setting: Toggle,
    },
}

/// Output format for status
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human readable table
    Table,
    /// JSON document
    Json,
}

/// On/off switch
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    /// Enabled
    On,
    /// Disabled
    Off,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    smol::block_on(async {
        let binder = commands::connect(cli.config.as_deref()).await?;

        match cli.command {
            Commands::Interfaces => commands::interfaces::run(&binder).await,
            Commands::Status { format } => commands::status::run(&binder, format).await,
            Commands::Bind { name } => commands::bind::run(&binder, &name).await,
            Commands::Unbind => commands::bind::unbind(&binder).await,
            Commands::Restart => commands::restart::run(&binder).await,
            Commands::Graceful { setting } => {
                commands::restart::set_graceful(&binder, setting == Toggle::On).await
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_with_global_config() {
        let cli = Cli::parse_from(["clutch", "bind", "utun3", "--config", "/tmp/clutch.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/clutch.yaml")));
        assert!(matches!(cli.command, Commands::Bind { name } if name == "utun3"));
    }

    #[test]
    fn test_parse_status_format() {
        let cli = Cli::parse_from(["clutch", "status", "--format", "json"]);
        assert!(matches!(cli.command, Commands::Status { format: Format::Json }));

        let cli = Cli::parse_from(["clutch", "status"]);
        assert!(matches!(cli.command, Commands::Status { format: Format::Table }));
    }

    #[test]
    fn test_parse_graceful_toggle() {
        let cli = Cli::parse_from(["clutch", "graceful", "off"]);
        assert!(matches!(cli.command, Commands::Graceful { setting: Toggle::Off }));
        assert!(Cli::try_parse_from(["clutch", "graceful", "maybe"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
