use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{info, warn};

use coop_core::WordListEvaluator;
use coop_server::{
    config::Config, create_routes, identity::IdentityService, room_store::RoomStore,
    websocket::ConnectionManager,
};

/// Fallback vocabulary so a bare checkout serves games without an external
/// word list. Point WORD_LIST_PATH at a real list for production.
const BUILTIN_WORDS: &str = "\
about\nabove\nafter\nagain\napple\nbeach\nblack\nbrown\ncandle\nchair\n\
cherry\nclose\ncrane\ndance\ndream\nearly\neight\nfield\nflame\nfruit\n\
garden\nglass\ngreen\nhouse\nlemon\nlight\nmarble\nmusic\nnight\nocean\n\
orange\npaper\npiano\nplace\nplant\npoint\nquiet\nright\nriver\nround\n\
seven\nshore\nsilver\nsmile\nstone\nstorm\nsugar\ntable\nthree\ntiger\n\
today\ntrain\nvoice\nwater\nwhich\nwhite\nwinter\nworld\nwrite\nyellow";

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting coop word room server...");

    let config = Config::new();

    let evaluator = match &config.word_list_path {
        Some(path) => match WordListEvaluator::from_file(path) {
            Ok(evaluator) => {
                info!("Loaded word list from {}", path);
                Arc::new(evaluator)
            }
            Err(e) => {
                tracing::error!("Failed to load word list: {:#}", e);
                tracing::error!("Set WORD_LIST_PATH to a readable file, one word per line.");
                std::process::exit(1);
            }
        },
        None => {
            warn!("WORD_LIST_PATH not set; using the built-in vocabulary");
            Arc::new(WordListEvaluator::from_word_list(BUILTIN_WORDS))
        }
    };
    if evaluator.word_count() == 0 {
        tracing::error!("Word list is empty after filtering; nothing to play");
        std::process::exit(1);
    }
    info!("{} playable words", evaluator.word_count());

    let connections = Arc::new(ConnectionManager::new());
    let store = Arc::new(RoomStore::new(
        evaluator,
        config.max_attempts,
        config.room_code_length,
    ));
    let identity = Arc::new(IdentityService::new());

    let routes = create_routes(connections.clone(), store.clone(), identity);

    // Periodic sweep of dead connections and finished rooms
    {
        let connections = connections.clone();
        let store = store.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                connections
                    .cleanup_inactive_connections(Duration::from_secs(
                        config.connection_timeout_seconds,
                    ))
                    .await;
                store
                    .cleanup_stale_rooms(Duration::from_secs(config.room_timeout_minutes * 60))
                    .await;
            }
        });
    }

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (
        config.host.parse::<std::net::IpAddr>().expect("Invalid HOST"),
        config.port,
    );

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
                .expect("Failed to install SIGINT handler");
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}
