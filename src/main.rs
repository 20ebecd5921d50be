mod api;
mod config;
mod domain;
mod error;
mod logging;
mod models;
mod registry;
mod scheduler;
mod service;
mod state;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{CheckerConfig, ConfigLoader};
use crate::models::DomainResponse;
use crate::registry::NicArClient;
use crate::service::{QueryService, ServiceSettings};
use crate::state::ResultStore;

#[derive(Parser)]
#[command(name = "nicar-check")]
#[command(about = "Cached availability checks for .ar domains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Configuration file (JSON, YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database holding cached results and history
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Address to listen on, e.g. 0.0.0.0:8000
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Check a single domain and print the result as JSON
    Check {
        #[command(flatten)]
        common: CommonArgs,

        /// Domain name, with or without its zone
        domain: String,

        /// Zone such as .com.ar, when not part of the domain
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// Print the most recent lookups as JSON
    History {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of records to show
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

impl Commands {
    fn common(&self) -> &CommonArgs {
        match self {
            Commands::Serve { common, .. }
            | Commands::Check { common, .. }
            | Commands::History { common, .. } => common,
        }
    }
}

impl CommonArgs {
    fn load_config(&self) -> Result<CheckerConfig> {
        let mut config = ConfigLoader::load_or_default(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database_path = database.clone();
        }
        Ok(config)
    }
}

async fn build_service(config: &CheckerConfig) -> Result<(Arc<QueryService>, Arc<ResultStore>)> {
    let store = Arc::new(ResultStore::open(&config.database_path).await?);
    let client = Arc::new(NicArClient::new(&config.registry)?);
    let service = Arc::new(QueryService::new(
        store.clone(),
        client,
        ServiceSettings::from(config),
    ));
    Ok((service, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = cli.command.common().load_config()?;

    // Keeps the file writer flushing until exit.
    let _log_guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve { listen, .. } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }

            tracing::info!(
                "Starting nicar-check (database: {}, freshness: {}s)",
                config.database_path.display(),
                config.freshness_secs
            );
            let (service, store) = build_service(&config).await?;

            let shutdown = CancellationToken::new();
            let server = api::ApiServer::new(service, config.history_limit);
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutting down gracefully...");
                }
                token.cancel();
            });

            server.run(&config.listen, shutdown).await?;
            store.close().await;
        }
        Commands::Check { domain, zone, .. } => {
            let (service, store) = build_service(&config).await?;

            let outcome = service.check_domain(&domain, zone.as_deref()).await;
            store.close().await;

            let outcome = outcome?;
            let response = DomainResponse::new(&outcome.key, &outcome.result);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::History { limit, .. } => {
            let (service, store) = build_service(&config).await?;

            let records = service.history(limit.unwrap_or(config.history_limit)).await;
            store.close().await;

            let responses: Vec<DomainResponse> = records.iter().map(DomainResponse::from).collect();
            println!("{}", serde_json::to_string_pretty(&responses)?);
        }
    }

    Ok(())
}
