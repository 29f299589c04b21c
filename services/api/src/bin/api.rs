//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, LocalDiskStorage},
    config::{Config, StorageBackend},
    error::ApiError,
    web::{rest::ApiDoc, router, spawn_janitor, state::AppState},
};
use axum::http::{header::ACCEPT, header::CONTENT_TYPE, HeaderValue, Method};
use axum::Router;
use speakfree_core::memory::{
    InMemoryReportRepository, InMemorySchoolDirectory, InMemorySessionLedger,
};
use speakfree_core::ports::{ReportRepository, SchoolDirectory, SessionLedger};
use speakfree_core::uploads::UploadPolicy;
use speakfree_core::{InMemorySessionStore, IntakeEngine};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

struct Persistence {
    directory: Arc<dyn SchoolDirectory>,
    reports: Arc<dyn ReportRepository>,
    ledger: Arc<dyn SessionLedger>,
}

async fn connect(config: &Config) -> Result<Persistence, ApiError> {
    match &config.backend {
        StorageBackend::Postgres { database_url } => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            if !config.seed_schools.is_empty() {
                warn!("SEED_SCHOOLS is ignored with the postgres backend.");
            }
            Ok(Persistence {
                directory: db_adapter.clone(),
                reports: db_adapter.clone(),
                ledger: db_adapter,
            })
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory backend: reports are lost on restart.");
            let schools = Arc::new(InMemorySchoolDirectory::from_schools(
                config.seed_schools.iter().cloned(),
            ));
            info!(schools = config.seed_schools.len(), "Seeded school directory.");
            Ok(Persistence {
                directory: schools.clone(),
                reports: Arc::new(InMemoryReportRepository::new(schools)),
                ledger: Arc::new(InMemorySessionLedger::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Persistence & Attachment Storage ---
    let persistence = connect(&config).await?;
    let storage = Arc::new(LocalDiskStorage::new(config.upload_dir.clone()));
    storage.ensure_root().await?;
    info!("Storing attachments under {}", config.upload_dir.display());

    // --- 3. The Intake Engine ---
    let engine = Arc::new(IntakeEngine::new(
        persistence.directory,
        persistence.reports.clone(),
        persistence.ledger,
        Arc::new(InMemorySessionStore::new()),
        storage.clone(),
        config.intake_settings(),
    ));

    let shutdown = CancellationToken::new();
    let janitor = spawn_janitor(
        engine.clone(),
        Duration::from_secs(config.janitor_interval_secs),
        shutdown.clone(),
    );

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        engine,
        reports: persistence.reports,
        storage,
        upload_policy: UploadPolicy {
            max_bytes: config.max_upload_bytes,
        },
        config: config.clone(),
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Could not listen for the shutdown signal.");
            }
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = janitor.await {
        warn!("Janitor task ended abnormally: {}", e);
    }
    info!("Server stopped.");
    Ok(())
}
