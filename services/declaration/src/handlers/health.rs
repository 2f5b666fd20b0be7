use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_healthy = database::check_database_health(&state.db).await;
    let catalog_seeded = db_healthy && database::check_catalog_seeded(&state.db).await;

    let status = if db_healthy { "healthy" } else { "unhealthy" };
    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(serde_json::json!({
        "service": "declaration-service",
        "status": status,
        "database": if db_healthy { "connected" } else { "disconnected" },
        "catalog": if catalog_seeded { "seeded" } else { "empty" },
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
