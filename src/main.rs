use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kickcast::db::Repository;
use kickcast::{api, cli, AppContext, Config};

#[derive(Parser)]
#[command(name = "kickcast")]
#[command(about = "Football match sync, form statistics and score predictions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and the background sync tasks
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Run a sync cycle now
    Sync {
        /// teams, matches or all
        #[arg(short, long, default_value = "all")]
        entity: String,
        /// Ignore the minimum refresh interval
        #[arg(short, long)]
        force: bool,
        /// Limit a matches sync to one matchday
        #[arg(short, long)]
        matchday: Option<u32>,
    },
    /// Show predictions for a matchday (defaults to the next one)
    Predict {
        #[arg(short, long)]
        matchday: Option<i32>,
    },
    /// Score predictions against finished matches
    Quality {
        /// Write the scored matches to a CSV file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },
    /// Database counts and last sync per entity
    Status,
    /// Current league table
    Table,
    /// Look up a team and its form
    Team {
        #[arg(short, long)]
        name: String,
    },
    /// Initialize the database
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kickcast=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            let repo = Repository::connect(&config.database_url).await?;
            repo.init_schema().await?;
        }
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting Kickcast API server on port {}", port);
            api::serve(AppContext::connect_with_startup_retry(config).await?, port).await?;
        }
        Some(Commands::Sync { entity, force, matchday }) => {
            let ctx = AppContext::connect(config).await?;
            cli::sync(&ctx, &entity, force, matchday).await?;
        }
        Some(Commands::Predict { matchday }) => {
            let ctx = AppContext::connect(config).await?;
            cli::predict(&ctx, matchday).await?;
        }
        Some(Commands::Quality { export }) => {
            let ctx = AppContext::connect(config).await?;
            cli::quality(&ctx, export.as_deref()).await?;
        }
        Some(Commands::Status) => {
            let ctx = AppContext::connect(config).await?;
            cli::status(&ctx).await?;
        }
        Some(Commands::Table) => {
            let ctx = AppContext::connect(config).await?;
            cli::table(&ctx).await?;
        }
        Some(Commands::Team { name }) => {
            tracing::info!("Querying team: {}", name);
            let ctx = AppContext::connect(config).await?;
            cli::query_team(&ctx, &name).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting Kickcast API server on port 3000");
            api::serve(AppContext::connect_with_startup_retry(config).await?, 3000).await?;
        }
    }

    Ok(())
}
