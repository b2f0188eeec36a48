use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::error::{insert_rate_headers, ApiError};
use crate::app::AppState;
use crate::error::GatewayError;
use crate::models::rate_limiter::ANONYMOUS_CLIENT;
use crate::models::ChatRequest;

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// POST /v1/chat
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let span = info_span!(
        "chat",
        %request_id,
        client = client_id.unwrap_or(ANONYMOUS_CLIENT)
    );
    let mut response = match handle_chat(&state, client_id, body).instrument(span).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn handle_chat(
    state: &AppState,
    client_id: Option<&str>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let limiter = state.rate_limiter();
    let decision = limiter.check(client_id).await;
    if !decision.allowed {
        warn!(count = decision.count, limit = decision.limit, "Rate limit exceeded");
        return Err(ApiError::RateLimited(decision));
    }

    // Unreadable or oversized bodies are the caller's fault, like malformed JSON.
    let body = body.map_err(|e| GatewayError::invalid_request(e.body_text()))?;
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::invalid_request(e.to_string()))?;

    debug!(
        provider = ?request.provider,
        preset = %request.preset,
        messages = request.messages.len(),
        "Chat request accepted"
    );

    let (response, attempts) = state.orchestrator().send_with_fallback(&request).await?;
    for attempt in &attempts {
        debug!(
            provider = %attempt.provider,
            attempt = attempt.attempt_number,
            success = attempt.success,
            elapsed_ms = attempt.response_time_ms,
            error = attempt.error.as_deref().unwrap_or(""),
            "Provider attempt"
        );
    }
    info!(provider = %response.provider, model = %response.model, "Chat request completed");

    let mut http_response = Json(response.into_envelope()).into_response();
    if limiter.config().enable_rate_limiting {
        insert_rate_headers(http_response.headers_mut(), &decision);
    }
    Ok(http_response)
}
