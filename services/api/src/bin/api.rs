//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, LocalStateAdapter},
    config::Config,
    error::ApiError,
    web::{get_exam_handler, rest::ApiDoc, state::AppState, ws_handler},
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use exam_core::policy::SecurityPolicy;
use exam_core::ports::{ExamStore, SnapshotStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Local Session State ---
    let local_adapter = Arc::new(LocalStateAdapter::new(config.local_state_dir.clone()));
    local_adapter.ensure_dir().await?;
    replay_pending_submissions(&local_adapter, db_adapter.as_ref()).await;

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store: db_adapter,
        local: local_adapter,
        config: config.clone(),
        policy: SecurityPolicy {
            violation_limit: config.violation_limit,
        },
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/exams/{exam_id}", get(get_exam_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Replays submissions that were queued locally while the database was
/// unreachable. Anything that still fails goes back into the queue.
async fn replay_pending_submissions(local: &LocalStateAdapter, store: &dyn ExamStore) {
    let pending = match local.take_pending_submissions().await {
        Ok(pending) => pending,
        Err(e) => {
            warn!("Could not read the pending submission queue: {e}");
            return;
        }
    };
    if pending.is_empty() {
        return;
    }

    info!("Replaying {} pending submission(s)...", pending.len());
    for submission in pending {
        if let Err(e) = store.upsert_submission(&submission).await {
            warn!(
                "Submission for admission {} still failing, re-queueing: {e}",
                submission.admission_id
            );
            if let Err(e) = local.queue_pending_submission(&submission).await {
                warn!("Failed to re-queue submission: {e}");
            }
        }
    }
}
