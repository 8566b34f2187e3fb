//! # Health Check Handler
//!
//! Simple endpoint to check if the server is running.
//! Used by load balancers and monitoring systems.

use axum::Json;
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "healthy",
///   "service": "passkey-rp-server"
/// }
/// ```
///
/// Never touches the database, so it reports the process, not the store.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME")
    }))
}
