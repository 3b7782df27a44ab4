use clap::{Parser, Subcommand};
use routeslot_core::{config::AppConfig, proxy::SqliteProxyStore};

mod commands;
use commands::{handle_config_command, handle_proxies_command, ConfigCommands, ProxiesCommands};

#[derive(Parser)]
#[command(name = "routeslot-cli")]
#[command(about = "RouteSlot CLI - manage the proxy pool and configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Proxy store URL; defaults to `store.database_url` from the configuration
    #[arg(long, env = "ROUTESLOT_DATABASE_URL")]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Proxy pool management
    #[command(subcommand)]
    Proxies(ProxiesCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Proxies(command) => {
            let (database_url, max_connections) = match cli.database {
                Some(url) => (url, 1),
                None => {
                    let config = AppConfig::load()?;
                    (config.store.database_url, config.store.max_connections)
                }
            };

            let store = SqliteProxyStore::connect(&database_url, max_connections).await?;
            handle_proxies_command(command, &store).await?;
        }

        Commands::Config(command) => handle_config_command(command)?,
    }

    Ok(())
}
