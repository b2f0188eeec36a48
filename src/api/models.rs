use axum::{extract::State, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::models::ProviderModels;

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub providers: Vec<ProviderModels>,
}

/// GET /v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        providers: state.orchestrator().describe().await,
    })
}
