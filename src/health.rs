//! Liveness endpoint.
//!
//! `GET /health` answers `{"status": "healthy", "timestamp": "..."}` with the
//! current UTC time. It touches no upstream service and never consults the gate.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Timestamp layout used in health responses.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Body of a health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
}

impl HealthReport {
    /// Report for the given instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            status: "healthy",
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// `GET /health`
pub async fn health() -> Json<HealthReport> {
    Json(HealthReport::at(Utc::now()))
}
