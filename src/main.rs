/*!
 * Trainee Notifications - Notification Orchestrator
 *
 * Main application entry point. Wires the queue consumers, the rules
 * engine, the durable scheduler and the dispatch workers together, and
 * serves the admin/health API.
 */

// Module declarations
mod clients;
mod config;
mod db;
mod handlers;
mod ingest;
mod models;
mod routes;
mod services;
mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clients::{
    build_http_client, IdentityClient, MessagingClient, ProfileClient, ReferenceClient,
};
use config::Config;
use db::create_pool;
use handlers::AppState;
use ingest::IngestContext;
use routes::create_api_v1_routes;
use services::{
    BroadcastService, ContactService, DispatchService, EmailService, HistoryService,
    InAppService, RecipientService, SchedulerService, TemplateService,
};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: String,
    database: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trainee Notifications...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Timezone: {}", config.rules.timezone);

    // Create database connection pool
    let pool = create_pool(&config.database).await?;
    tracing::info!("Database connection pool created successfully");

    // Run pending migrations
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Redis connection for the inbound event queues
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    tracing::info!("Redis connection established");

    // Shared HTTP client for SPI calls and broadcasts
    let http_client = build_http_client(&config.spi);

    // SPI clients
    let identity = IdentityClient::new(http_client.clone(), config.spi.identity_base_url.clone());
    let profile = ProfileClient::new(http_client.clone(), config.spi.profile_base_url.clone());
    let messaging =
        MessagingClient::new(http_client.clone(), config.spi.messaging_base_url.clone());
    let reference =
        ReferenceClient::new(http_client.clone(), config.spi.reference_base_url.clone());

    // Core services
    let templates = TemplateService::new(config.templates.clone())
        .map_err(|e| anyhow::anyhow!("Template initialisation failed: {}", e))?;
    let broadcast = BroadcastService::new(http_client.clone(), &config.broadcast);
    if broadcast.is_enabled() {
        tracing::info!("Broadcast publisher enabled");
    }
    let history = HistoryService::new(pool.clone(), broadcast, templates.clone());
    let recipient = RecipientService::new(identity, profile, messaging, &config.rules);
    let contacts = ContactService::new(reference);
    let in_app = InAppService::new(history.clone());

    let email = EmailService::new(config.email.as_ref())?;
    if email.is_enabled() {
        tracing::info!("Email transport initialized and enabled");
    } else {
        tracing::info!("Email transport disabled - SMTP not configured");
    }

    let dispatch = Arc::new(DispatchService::new(
        history.clone(),
        recipient.clone(),
        contacts.clone(),
        templates.clone(),
        email,
    ));
    let scheduler = Arc::new(SchedulerService::new(
        pool.clone(),
        history.clone(),
        config.scheduling.clone(),
    ));

    // Shutdown coordination
    let shutdown = CancellationToken::new();

    // Scheduler loop: drains overdue triggers at startup, then polls
    let scheduler_task = tokio::spawn(
        scheduler
            .clone()
            .run(dispatch.clone(), shutdown.clone()),
    );
    tracing::info!("Scheduler started");

    // Queue consumers
    let ingest_context = IngestContext::new(
        &config,
        scheduler.clone(),
        dispatch.clone(),
        history.clone(),
        in_app,
        recipient,
        contacts,
        templates.clone(),
    );
    ingest::spawn_consumers(
        redis,
        ingest_context,
        config.redis.channel_capacity,
        shutdown.clone(),
    )
    .await;

    // Admin and health API
    let app_state = AppState {
        pool: pool.clone(),
        history,
        scheduler,
        dispatch,
        templates,
    };
    let app = create_app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    tracing::info!("HTTP server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    // Let the scheduler drain in-flight jobs before exiting
    let _ = scheduler_task.await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Create the Axum application router
fn create_app(state: AppState) -> Router {
    let pool_for_health = state.pool.clone();

    Router::new()
        .route(
            "/health",
            get(move || health_handler(pool_for_health.clone())),
        )
        .route("/api/version", get(version_handler))
        .nest("/api/v1", create_api_v1_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Health check handler
async fn health_handler(pool: sqlx::PgPool) -> impl IntoResponse {
    // Test database connection
    let db_status = match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            "disconnected"
        }
    };

    let response = HealthResponse {
        status: if db_status == "connected" {
            "healthy"
        } else {
            "unhealthy"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: db_status.to_string(),
    };

    let status_code = if db_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// Version info handler
async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
