pub mod catalog;
pub mod config;
pub mod connect_api;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod logging;
pub mod models;
pub mod services;
pub mod tools;

#[cfg(test)]
mod tests;

use axum::routing::{delete, get, post};
use config::Config;
use error::AppError;
use handlers::AppState;
use tower_http::cors::{Any, CorsLayer};

/// Builds the HTTP router over a prepared state.
pub fn build_router(app_state: AppState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/api/health", get(handlers::health_check))
        // Chat routes
        .route("/api/chat", post(handlers::chat_handler))
        // Dataflow routes
        .route(
            "/api/dataflow/configure",
            post(handlers::configure_dataflow_handler),
        )
        // Tool routes
        .route("/api/tools", get(handlers::list_tools_handler))
        // Catalog routes
        .route("/api/catalog", delete(handlers::clear_catalog_handler))
        .route(
            "/api/catalog/{org_id}",
            delete(handlers::invalidate_catalog_handler),
        )
        .layer(cors)
        .with_state(app_state)
}

pub async fn run() -> Result<(), AppError> {
    // Load .env file (ok to fail if not present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    logging::init(&config.log_filter);

    let app_state = AppState::from_config(&config)?;
    tracing::info!(
        provider = app_state.llm.name(),
        model = %config.model,
        tools = ?app_state.tool_registry.tool_names(),
        "copilot initialized"
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind {}: {e}", config.bind_addr)))?;
    let addr = listener
        .local_addr()
        .map_err(|e| AppError::Internal(format!("Failed to read bound address: {e}")))?;
    tracing::info!("API server listening on http://{addr}");

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
            tracing::info!("shutting down");
        })
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {e}")))
}
