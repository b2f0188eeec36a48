//! HTTP surface of the gateway

pub mod chat;
pub mod error;
pub mod health;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::app::AppState;

pub use error::ApiError;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat", post(chat::chat))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health::health_check))
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .with_state(state)
}
