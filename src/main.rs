use std::sync::Arc;

use anyhow::Context;
use private_chat::{
    broker::{BrokerBridge, NatsBus},
    db::{create_pool, redact_database_url, run_migrations},
    message::{MessageRepository, MessageService},
    routes::create_router,
    state::{AppState, Config},
    user::UserRepository,
    websocket::ConnectionRegistry,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,private_chat=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env().context("Invalid configuration")?);

    // Sanitize URL for logging (hide password)
    let url_for_logging = redact_database_url(&config.database_url);

    tracing::info!("Connecting to database at {}...", url_for_logging);
    let db = create_pool(&config.database_url, config.database_max_connections)
        .await
        .with_context(|| format!("Failed to connect to database at {}", url_for_logging))?;

    // Run migrations
    tracing::info!("Running migrations...");
    run_migrations(&db).await.context("Failed to run migrations")?;

    // Connect to the broker for live delivery
    tracing::info!("Connecting to NATS at {}...", config.nats_url);
    let bus = NatsBus::connect(
        &config.nats_url,
        config.nats_connect_retries,
        config.nats_retry_delay,
    )
    .await
    .context("Failed to connect to NATS")?;
    let broker = Arc::new(BrokerBridge::new(Arc::new(bus)));

    // Create repositories
    let message_repository = Arc::new(MessageRepository::new(db.clone()));
    let user_repository = Arc::new(UserRepository::new(db.clone()));

    // Create services
    let message_service =
        MessageService::new(message_repository, user_repository, broker.clone());

    // Create application state
    let state = AppState {
        config: config.clone(),
        message_service,
        ws_connections: ConnectionRegistry::new(),
        broker: broker.clone(),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    broker.close().await;
    db.close().await;
    tracing::info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
