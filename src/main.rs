use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use tokenmux::{AppState, Config, Identity};

/// Operate the refresh token store and make authenticated calls.
#[derive(Parser)]
#[command(name = "tokenmux", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the refresh token table.
    Migrate,
    /// Record a refresh token obtained out of band as the newest for an identity.
    Register { identity: String, refresh_token: String },
    /// Show an identity's refresh token history (fingerprints only).
    History { identity: String },
    /// GET a URL as an identity and print the response.
    Get { identity: String, url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokenmux=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let state = AppState::from_config(config).await?;

    match cli.command {
        Commands::Migrate => {
            state.history.migrate().await?;
            info!("Refresh token table ready");
        }
        Commands::Register {
            identity,
            refresh_token,
        } => {
            let identity = Identity::new(identity);
            state.store.save_refresh_token(&identity, &refresh_token).await?;
        }
        Commands::History { identity } => {
            for row in state.history.history(&Identity::new(identity)).await? {
                println!(
                    "{}  {}  {}",
                    row.created_at.to_rfc3339(),
                    if row.valid { "valid  " } else { "invalid" },
                    &row.token_hash[..12],
                );
            }
        }
        Commands::Get { identity, url } => {
            let resp = state.client.get(&Identity::new(identity), &url).await?;
            println!("Status: {}", resp.status());
            println!("{}", resp.text().await?);
        }
    }

    Ok(())
}
