//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

/// Response body for `GET /attribute/:account/:sub/:attribute`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributeResponse {
    pub account_code: String,
    pub sub_account_code: String,
    pub attribute_code: String,
    pub attribute_value: String,
}

/// Response body for `POST /attribute`
#[derive(Debug, Clone, Serialize)]
pub struct SetAttributeResponse {
    /// Success message
    pub message: String,
    /// Composite key that was written
    pub key: String,
}

impl SetAttributeResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Attribute '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for `DELETE /attribute`
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Generation that is live after the clear
    pub generation: u64,
}

impl ClearResponse {
    pub fn new(generation: u64) -> Self {
        Self {
            message: "Cache cleared".to_string(),
            generation,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
