//! Axum Router Configuration
//!
//! HTTP routing for call signaling, the media-stream WebSocket and health,
//! plus the OpenAPI document describing the HTTP surface.

use crate::{
    handlers::{self, ErrorResponse, HealthResponse, IncomingCall, MEDIA_STREAM_PATH},
    state::AppState,
    ws::media_stream_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::incoming_call, handlers::health),
    components(schemas(IncomingCall, HealthResponse, ErrorResponse)),
    tags(
        (name = "Call Bridge", description = "Bridges telephony media streams to a realtime voice model")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/incoming-call", post(handlers::incoming_call))
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .route("/health", get(handlers::health))
        .with_state(app_state)
}
