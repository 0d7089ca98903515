use colab_relay::db::{DocumentStore, MemoryDocumentStore, PgDocumentStore};
use colab_relay::routes::create_router;
use colab_relay::{AppState, Config};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before tracing so the default filter can use it
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.default_log_filter().into()))
        .init();

    info!("Starting server...");
    match &loaded {
        Ok(_) => info!("✅ Configuration loaded successfully"),
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
        }
    }

    // Pick the document store
    let store: Arc<dyn DocumentStore> = match &config.db_url {
        Some(db_url) => match PgDocumentStore::connect(db_url, config.db_max_connections).await {
            Ok(store) => {
                info!("Database initialized successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No database URL configured - using an empty in-memory document store");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every caller will be anonymous and refused");
    }
    if config.is_development() {
        info!("Running in development mode");
    }

    let address = config.server_address();
    let app_state = Arc::new(AppState::new(config, store));
    let app_routes = create_router(app_state);

    // Start the HTTP/WebSocket server
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws/documents/{{doc_id}}/", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
