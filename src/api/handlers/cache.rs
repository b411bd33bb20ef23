use axum::{extract::State, Json};

use crate::api::handlers::AppState;

pub async fn cache_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache = state.pipeline.cache();
    let stats = cache.get_stats();

    Json(serde_json::json!({
        "size": cache.size(),
        "hit_ratio": stats.hit_ratio(),
        "stats": stats,
    }))
}
