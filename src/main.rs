use colabri_realtime::broadcast::{InProcessPubSub, PubSubTransport};
use colabri_realtime::config::Config;
use colabri_realtime::db::PgPresenceStore;
use colabri_realtime::presence::{MemoryPresenceStore, PresenceStore};
use colabri_realtime::routes::create_app;
use colabri_realtime::services::sweeper::spawn_sweepers;
use colabri_realtime::AppState;
use std::net::SocketAddr;
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "colabri_realtime=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Presence is persisted in Postgres when a database URL is provided
    let store: Arc<dyn PresenceStore> = match &config.db_url {
        Some(db_url) => match PgPresenceStore::connect(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Presence will only be kept in memory");
                Arc::new(MemoryPresenceStore::new())
            }
        },
        None => {
            warn!("No database URL configured - presence will only be kept in memory");
            Arc::new(MemoryPresenceStore::new())
        }
    };

    let pubsub: Arc<dyn PubSubTransport> = Arc::new(InProcessPubSub::new(config.broadcast_capacity));
    let address = config.server_address();
    let state = AppState::new(config, store, pubsub);

    // Relay what other instances publish
    let _subscriptions = match state.bridge.start().await {
        Ok(handles) => handles,
        Err(e) => {
            error!("Failed to start broadcast bridge: {}", e);
            Vec::new()
        }
    };
    let _sweepers = spawn_sweepers(state.clone());

    let app_routes = create_app(state);

    // Start the HTTP/API server
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            return;
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app_routes.into_make_service_with_connect_info::<SocketAddr>()).await {
        error!("Server stopped: {}", e);
    }
}
