use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pr1sm::builder::PackBuilder;
use pr1sm::config::SourceConfig;
use pr1sm::fetcher::{RedditFetcher, DEFAULT_BASE_URL};
use pr1sm::routes::{self, AppState};
use pr1sm::store::PackStore;

/// Morning pack aggregator
#[derive(Parser, Debug)]
#[command(name = "pr1sm")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Source config file (TOML)
    #[arg(long, default_value = "config.toml", env = "PR1SM_CONFIG")]
    config: PathBuf,

    /// Persisted pack document
    #[arg(long, default_value = "data/morning.json", env = "PR1SM_DATA")]
    data: PathBuf,

    /// Upstream base URL
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "PR1SM_UPSTREAM")]
    upstream: String,

    /// Per-source fetch timeout in seconds
    #[arg(long, default_value_t = 10, env = "PR1SM_FETCH_TIMEOUT")]
    fetch_timeout: u64,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "PORT")]
    port: u16,

    /// Name used in the greeting
    #[arg(long, default_value = "Benedict", env = "PR1SM_USER")]
    user: String,

    /// Static files served for unmatched paths
    #[arg(long, default_value = "public", env = "PR1SM_PUBLIC_DIR")]
    public_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Serve the pack over HTTP
    #[default]
    Serve,
    /// Run one refresh and exit, for cron-style invokers
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pr1sm=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let store = Arc::new(PackStore::new(&args.data));
    if store.ensure_seeded().await? {
        info!("No pack found, wrote empty seed");
    }

    let fetcher = RedditFetcher::with_base_url(
        &args.upstream,
        Duration::from_secs(args.fetch_timeout),
    )
    .context("Failed to create HTTP client")?;
    let builder = Arc::new(PackBuilder::new(Arc::new(fetcher), store.clone()));

    match args.command.unwrap_or_default() {
        Command::Refresh => {
            let config = SourceConfig::load(&args.config);
            let pack = builder.build(&config).await?;
            info!("Refreshed pack with {} items", pack.items.len());
        }
        Command::Serve => {
            let state = Arc::new(AppState {
                store,
                builder,
                config_path: args.config,
                user_name: args.user,
                public_dir: args.public_dir,
            });
            let app = routes::create_router(state);

            let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
            info!("Server starting on http://localhost:{}", args.port);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
