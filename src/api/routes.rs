//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, get_attribute_handler, health_handler, list_attributes_handler,
    reload_handler, set_attribute_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /attribute/:account/:sub/:attribute` - Read one attribute
/// - `POST /attribute` - Write an attribute and publish the change
/// - `GET /attribute` - List live attributes
/// - `DELETE /attribute` - Invalidate every attribute
/// - `POST /attribute/reload` - Subscribe, start ingestion and reload from seed
/// - `GET /stats` - Cache and ingestion statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/attribute",
            get(list_attributes_handler)
                .post(set_attribute_handler)
                .delete(clear_handler),
        )
        .route("/attribute/reload", post(reload_handler))
        .route(
            "/attribute/:account_code/:sub_account_code/:attribute_code",
            get(get_attribute_handler),
        )
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
