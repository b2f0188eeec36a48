use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::any::Any;
use tracing::error;

use crate::error::GatewayError;
use crate::models::RateDecision;

/// Handler failure rendered as `{"error": "<tag>:<detail>"}`.
#[derive(Debug)]
pub enum ApiError {
    Gateway(GatewayError),
    RateLimited(RateDecision),
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        ApiError::Gateway(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error, decision) = match self {
            ApiError::Gateway(error) => (error, None),
            ApiError::RateLimited(decision) => (GatewayError::RateLimited, Some(decision)),
        };

        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({ "error": error.to_string() });

        let mut response = (status, Json(body)).into_response();
        if let Some(decision) = decision {
            let headers = response.headers_mut();
            insert_rate_headers(headers, &decision);
            headers.insert("retry-after", HeaderValue::from(decision.reset_after));
        }
        response
    }
}

pub fn insert_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining()));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_after));
}

/// Turns a handler panic into a `server_error` JSON response.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "handler panicked".to_string()
    };

    error!(detail = %detail, "Request handler panicked");
    ApiError::Gateway(GatewayError::internal(detail)).into_response()
}
