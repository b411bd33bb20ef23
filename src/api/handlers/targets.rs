use axum::{extract::State, Json};

use crate::api::handlers::AppState;

/// Configured target stores; never includes connection URLs
pub async fn list_targets(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "targets": state.executor.targets()
    }))
}
