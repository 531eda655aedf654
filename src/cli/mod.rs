//! CLI module for Frizz
//!
//! - `serve`: connect to Discord and run the bot
//! - `config`: write or inspect the layered configuration

use clap::{Parser, Subcommand};

pub mod config;

/// Frizz card builder and giveaway bot
#[derive(Parser, Debug)]
#[command(name = "frizz")]
#[command(about = "Discord card builder and giveaway bot")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bot
    Serve,
    /// Manage configuration files
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Config { command }) => config::run(command),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["frizz", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));

        let cli = Cli::try_parse_from(["frizz", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                command: config::ConfigCommands::Init { force: true }
            })
        ));

        let cli = Cli::try_parse_from(["frizz"]).unwrap();
        assert!(cli.command.is_none());
    }
}
