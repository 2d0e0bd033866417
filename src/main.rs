//! Gridpool - NFL Squares Pool Backend
//!
//! Serves the squares API over SQLite and keeps finalized boards settled
//! against the live score feed.

use anyhow::{Context, Result};
use axum::middleware;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridpool_backend::{
    api::create_router,
    middleware::request_logging,
    models::Config,
    pool,
    scoreboard::{EspnClient, ScoreFeed},
    store::BoardStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridpool=info,gridpool_backend=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!("🏈 Gridpool backend starting");

    let store = Arc::new(BoardStore::new(&config.database_path)?);
    let feed: Arc<dyn ScoreFeed> = Arc::new(EspnClient::new());

    if config.poll_interval_secs > 0 {
        tokio::spawn(settlement_loop(
            store.clone(),
            feed.clone(),
            config.poll_interval_secs,
        ));
    } else {
        info!("background settlement loop disabled (POLL_INTERVAL_SECS=0)");
    }

    let app = create_router(store, feed)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Background sweep: every tick, run one settlement pass over each finalized,
/// non-archived board. Purely an optimization over client-driven polling —
/// resolution is stateless and idempotent, so overlapping passes from here
/// and from clients are harmless.
async fn settlement_loop(store: Arc<BoardStore>, feed: Arc<dyn ScoreFeed>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs));
    info!("settlement loop running every {}s", interval_secs);

    loop {
        ticker.tick().await;

        let boards = match store.list_boards(false) {
            Ok(boards) => boards,
            Err(e) => {
                error!("settlement loop could not list boards: {:#}", e);
                continue;
            }
        };

        for board in boards.into_iter().filter(|b| b.is_finalized) {
            match pool::trigger_resolution(&store, feed.as_ref(), &board.id, false).await {
                Ok(report) if !report.new_winners.is_empty() => {
                    info!(
                        board_id = %board.id,
                        count = report.new_winners.len(),
                        "settlement loop recorded new winner(s)"
                    );
                }
                Ok(_) => {}
                // Transient by construction: the next tick retries.
                Err(e) => warn!(board_id = %board.id, "settlement pass failed: {}", e),
            }
        }
    }
}
