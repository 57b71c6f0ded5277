//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, GetAttributeResponse, HealthResponse, SetAttributeRequest,
    SetAttributeResponse,
};
use crate::replication::ChangeMessage;
use crate::service::{CacheService, LoadReport, ServiceStats};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: CacheService,
}

impl AppState {
    pub fn new(service: CacheService) -> Self {
        Self { service }
    }
}

/// Handler for GET /attribute/:account_code/:sub_account_code/:attribute_code
///
/// Returns the live value, or 404 if it is absent, expired or invalidated.
pub async fn get_attribute_handler(
    State(state): State<AppState>,
    Path((account_code, sub_account_code, attribute_code)): Path<(String, String, String)>,
) -> Result<Json<GetAttributeResponse>> {
    let value = state
        .service
        .try_get(&account_code, &sub_account_code, &attribute_code)
        .await;

    match value {
        Some(attribute_value) => Ok(Json(GetAttributeResponse {
            account_code,
            sub_account_code,
            attribute_code,
            attribute_value,
        })),
        None => Err(CacheError::NotFound(
            CacheKey::new(account_code, sub_account_code, attribute_code).to_string(),
        )),
    }
}

/// Handler for POST /attribute
///
/// Applies the write locally and publishes it to the other replicas.
pub async fn set_attribute_handler(
    State(state): State<AppState>,
    Json(req): Json<SetAttributeRequest>,
) -> Result<Json<SetAttributeResponse>> {
    let change = ChangeMessage::from(req);
    let key = change.key().to_string();

    state.service.add_or_update(change).await?;

    Ok(Json(SetAttributeResponse::new(key)))
}

/// Handler for POST /attribute/reload
pub async fn reload_handler(State(state): State<AppState>) -> Json<LoadReport> {
    Json(state.service.load_initial_cache().await)
}

/// Handler for GET /attribute
///
/// Lists every live entry by composite key.
pub async fn list_attributes_handler(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, String>> {
    Json(state.service.entries().await)
}

/// Handler for DELETE /attribute
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let generation = state.service.clear_cache().await;
    Json(ClearResponse::new(generation.as_u64()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<ServiceStats> {
    Json(state.service.stats().await)
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
