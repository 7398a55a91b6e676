use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use feedwatch::feed::sleep_or_shutdown;
use feedwatch::{
    register_sources, Config, Database, FeedFetcher, HttpFetcher, Notifier, PollLoop, Result,
};

const DEFAULT_CONFIG_PATH: &str = "feedwatch.toml";

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    if let Err(e) = feedwatch::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        feedwatch::logging::init_console_only(&config.logging.level);
    }

    info!("feedwatch {} starting", env!("CARGO_PKG_VERSION"));

    let fetcher: Arc<dyn FeedFetcher> = match HttpFetcher::new(&config.fetch) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let notifier = match Notifier::from_config(&config.notify) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Cannot listen for shutdown signal: {}", e);
                // Dropping the sender would stop the loop.
                std::future::pending::<()>().await;
            }
        }
    });

    // Startup failures get the same cooldown as a failed cycle.
    let db = loop {
        match open_and_register(&config, fetcher.as_ref()).await {
            Ok(db) => break db,
            Err(e) => {
                error!(
                    "Startup failed: {}; retrying in {}s",
                    e, config.poll.cooldown_secs
                );
                if sleep_or_shutdown(config.poll.cooldown(), &mut shutdown_rx).await {
                    return;
                }
            }
        }
    };

    PollLoop::new(Arc::new(db), fetcher, notifier, &config.poll)
        .run(shutdown_rx)
        .await;
}

async fn open_and_register(config: &Config, fetcher: &dyn FeedFetcher) -> Result<Database> {
    let db = Database::open(&config.database.path).await?;
    let registered = register_sources(&db, fetcher, &config.sources).await?;
    info!(
        "{} of {} configured source(s) registered",
        registered,
        config.sources.len()
    );
    Ok(db)
}
