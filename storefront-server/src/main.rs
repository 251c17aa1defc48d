use std::sync::Arc;

use clap::Parser;
use storefront_core::{
    AccountStore, BackendConfig, EmbeddingProvider, MemoryAccountStore, MemoryProductStore,
    PgAccountStore, PgProductStore, ProductStore, StorefrontConfig, TokenIssuer,
};
use storefront_sync::{run_sync_loop, sync_catalog, FeedClient};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use storefront_server::http::{self, HttpState};
use storefront_server::subsystems::search::SearchService;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "storefront.toml")]
    config: String,

    /// Check database connectivity and exit
    #[arg(long, conflicts_with = "in_memory")]
    health: bool,

    /// Keep the catalog and accounts in memory instead of PostgreSQL
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match StorefrontConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let (store, accounts): (Arc<dyn ProductStore>, Arc<dyn AccountStore>) = if args.in_memory {
        tracing::warn!("Using in-memory storage; products and accounts are lost on exit");
        (
            Arc::new(MemoryProductStore::new()),
            Arc::new(MemoryAccountStore::new()),
        )
    } else {
        let pool = match storefront_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        if args.health {
            match storefront_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            }
            println!("✅ Storefront DB health check passed");
            return Ok(());
        }

        storefront_core::db::ensure_schema(&pool).await?;
        (
            Arc::new(PgProductStore::new(pool.clone())),
            Arc::new(PgAccountStore::new(pool)),
        )
    };

    if config.auth.uses_dev_secret() {
        tracing::warn!("auth.jwt_secret is the development default; set STOREFRONT__AUTH__JWT_SECRET");
    }
    let tokens = Arc::new(TokenIssuer::from_config(&config.auth));

    let provider = match BackendConfig::from_config(&config.embedding) {
        Ok(backend) => EmbeddingProvider::load(backend),
        Err(e) => {
            tracing::error!(error = %e, "Invalid embedding config; semantic search disabled");
            EmbeddingProvider::disabled(e.to_string())
        }
    };
    let search = Arc::new(SearchService::new(Arc::new(provider), &config.search));
    let feed = Arc::new(FeedClient::from_config(&config.sync)?);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if config.sync.on_startup {
        if let Err(e) = sync_catalog(&feed, store.as_ref()).await {
            tracing::warn!(error = %e, "Startup catalog sync failed; serving current catalog");
        }
    }

    tokio::spawn(run_sync_loop(
        Arc::clone(&feed),
        Arc::clone(&store),
        config.sync.interval_minutes,
        tx.subscribe(),
    ));

    let state = Arc::new(HttpState {
        config,
        store,
        search,
        feed,
        accounts,
        tokens,
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
