use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub app: String,
    pub version: String,
}

pub async fn root(State(state): State<AppState>) -> Json<HealthResponse> {
    health(State(state)).await
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        app: state.config.app_title.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
