// Library exports for HopSync Backend Core
// This file exposes modules and functions for library consumers

pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use db::{DieselDatabaseConfig, DieselPool};
pub use models::{
    CloudAccount, CopyJob, ItemStatus, JobStatus, PlanTier, ProviderKind, Slot, TransferItem,
    TransferJob, UserPlan,
};
pub use providers::{
    CancelProbe, DriveAdapter, GraphAdapter, ProviderError, RemoteItem, StorageAdapter,
};
pub use services::{
    CredentialVault, QuotaService, TokenService, TransferRequestItem, TransferService, VaultError,
};
pub use utils::{TransferError, TransferErrorResponse};

// Re-export handler route builders
pub use handlers::{account_routes, transfer_routes};

// Library initialization function for external consumers
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use tracing::info;

    // Load environment
    dotenv::dotenv().ok();

    // Initialize config
    let config = app_config::config();

    // Initialize database pool
    info!("Initializing database pool...");
    let db_config = db::DieselDatabaseConfig::default();
    let max_connections = db_config.max_connections;
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    // Initialize services
    let vault = Arc::new(CredentialVault::from_config()?);
    let token_service = Arc::new(TokenService::new(diesel_pool.clone(), Arc::clone(&vault)));
    let quota_service = Arc::new(QuotaService::new(diesel_pool.clone()));
    let transfer_service = Arc::new(TransferService::new(
        diesel_pool.clone(),
        Arc::clone(&token_service),
        Arc::clone(&quota_service),
    ));

    // Create app state
    Ok(AppState {
        config: Arc::new(config.clone()),
        diesel_pool,
        vault,
        token_service,
        quota_service,
        transfer_service,
        max_connections,
    })
}

// Health check handler
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;
    use axum::Json;

    let timestamp = chrono::Utc::now().to_rfc3339();

    match db::check_diesel_health(&state.diesel_pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "timestamp": timestamp,
                "database": {
                    "status": "healthy",
                    "max_connections": state.max_connections,
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "timestamp": timestamp,
                "database": {
                    "status": "unhealthy",
                    "error": format!("Database connection failed: {}", e),
                }
            })),
        ),
    }
}

// Full API router under /api/v1
pub fn api_router(state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .nest("/api/v1/transfers", transfer_routes())
        .nest("/api/v1/accounts", account_routes())
        .route("/api/v1/health", get(health_check))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
