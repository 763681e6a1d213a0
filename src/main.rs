use clap::{Parser, Subcommand};

use stoker::client::{StokerClient, DEFAULT_BASE_URL};
use stoker::{commands, config};

#[derive(Parser)]
#[command(name = "stoker", version, about = "Fleet node-property enrichment daemon")]
struct Cli {
    /// Base URL of the daemon admin API
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enrichment daemon
    Daemon {
        /// Address for the admin API
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,

        /// Extra config file merged on top of the default chain
        #[arg(long)]
        config: Option<String>,
    },

    /// Manage data sources on a running daemon
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// Trigger data source runs now
    Refresh {
        /// Limit to one data source
        #[arg(long)]
        source: Option<String>,

        /// Limit to one node
        #[arg(long)]
        node: Option<String>,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List configured data sources
    List,
    /// Show one data source as JSON
    Get { id: String },
    /// Create or update a data source from a descriptor file
    Apply { file: String },
    /// Delete a data source
    Delete { id: String },
    /// Show per-source run status
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
            config,
        } => commands::daemon::run(http_addr, log_level, config),
        command => {
            let base_url = match cli.api_url {
                Some(url) => url,
                None => config::load()?
                    .api_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            };
            let client = StokerClient::new(&base_url)?;

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                match command {
                    Commands::Daemon { .. } => unreachable!(),
                    Commands::Source { command } => match command {
                        SourceCommands::List => commands::source::list(&client).await,
                        SourceCommands::Get { id } => commands::source::get(&client, &id).await,
                        SourceCommands::Apply { file } => {
                            commands::source::apply(&client, &file).await
                        }
                        SourceCommands::Delete { id } => {
                            commands::source::delete(&client, &id).await
                        }
                        SourceCommands::Status => commands::source::status(&client).await,
                    },
                    Commands::Refresh { source, node } => {
                        commands::refresh::run(&client, source.as_deref(), node.as_deref()).await
                    }
                }
            })
        }
    }
}
