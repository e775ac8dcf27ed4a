use crate::infrastructure::http::middleware::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.connection_hub.connection_count().await,
    }))
}
