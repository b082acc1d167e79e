use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use crate::db;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
}

// GET /health - Liveness plus a round trip to the store
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match db::ping(&state.pool).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            tracing::warn!(error = %err, "health check could not reach the database");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    };

    (code, Json(response))
}
