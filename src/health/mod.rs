/*!
 * # Health Checks
 *
 * - Liveness (`/health`) answers as long as the process serves requests
 * - Readiness (`/health/readiness`) runs `SELECT 1` against the database
 * - Version (`/health/version`) reports the build version
 *
 * None of these routes require authentication.
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ReadinessReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            start_time: SystemTime::now(),
        }
    }

    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub async fn readiness(&self) -> ReadinessReport {
        let database = match crate::db::check_connection(&self.db_pool).await {
            Ok(latency) => ComponentHealth {
                status: HealthStatus::Up,
                latency_ms: Some(latency.as_millis() as u64),
                message: None,
            },
            Err(e) => {
                error!("Database readiness check failed: {}", e);
                ComponentHealth {
                    status: HealthStatus::Down,
                    latency_ms: None,
                    message: Some("database unreachable".to_string()),
                }
            }
        };

        let mut components = BTreeMap::new();
        components.insert("database".to_string(), database);
        let status = if components.values().all(|c| c.status == HealthStatus::Up) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };

        ReadinessReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime(),
            timestamp: Utc::now(),
            components,
        }
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is serving requests")),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Health check endpoint called");
    Json(json!({
        "status": HealthStatus::Up,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness check including the database
#[utoipa::path(
    get,
    path = "/health/readiness",
    responses(
        (status = 200, description = "Ready", body = ReadinessReport),
        (status = 503, description = "A dependency is down", body = ReadinessReport),
    ),
    tag = "health"
)]
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let report = state.readiness().await;
    let status_code = match report.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report))
}

pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health routes, nested under `/health`
pub fn health_routes(db_pool: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/readiness", get(readiness_check))
        .route("/version", get(version_info))
        .with_state(Arc::new(HealthState::new(db_pool)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use sea_orm::Database;
    use tower::ServiceExt;

    #[tokio::test]
    async fn readiness_reports_database_up() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let response = health_routes(Arc::new(db))
            .oneshot(Request::get("/readiness").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: ReadinessReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.status, HealthStatus::Up);
        assert_eq!(report.components["database"].status, HealthStatus::Up);
    }

    #[tokio::test]
    async fn readiness_reports_closed_pool_down() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let state = HealthState::new(Arc::new(db.clone()));
        db.close().await.unwrap();
        assert_eq!(state.readiness().await.status, HealthStatus::Down);
    }
}
