use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::AppState;
use crate::models::ProviderKind;

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    pub probe: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub kv: bool,
    pub groq_secret: bool,
    pub gemini_secret: bool,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_models: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_models: Option<usize>,
}

/// GET /health
pub async fn health_check(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Json<HealthResponse> {
    let kv = match state.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(backend = state.store().backend_name(), error = %e, "Store ping failed");
            false
        }
    };

    let orchestrator = state.orchestrator();
    let (groq_models, gemini_models) = if query.probe {
        let groq = orchestrator.client(ProviderKind::Groq).describe().await;
        let gemini = orchestrator.client(ProviderKind::Gemini).describe().await;
        (Some(groq.catalog.len()), Some(gemini.catalog.len()))
    } else {
        (None, None)
    };

    Json(HealthResponse {
        ok: kv,
        kv,
        groq_secret: orchestrator.client(ProviderKind::Groq).is_configured(),
        gemini_secret: orchestrator.client(ProviderKind::Gemini).is_configured(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        groq_models,
        gemini_models,
    })
}
