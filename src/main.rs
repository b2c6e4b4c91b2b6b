//! fans-list: cache-aside fans list service.
//!
//! Serves cursor-paginated follower lists from a per-user sorted range cache,
//! warming it from the relation store in the background on a miss.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use fans_list::app::build_state;
use fans_list::config::{Cli, Config};
use fans_list::server::api::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "fans_list=debug,tower_http=debug"
    } else {
        "fans_list=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("fans-list v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        default_page_size = config.pagination.default_page_size,
        max_warm_count = config.pagination.max_warm_count,
        cache_backend = ?config.cache.backend,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    let state = build_state(config.clone())?;
    let app = build_router(state);

    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
