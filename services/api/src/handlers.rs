//! Axum Handlers for the HTTP API
//!
//! Call signaling and health. The media stream itself is served by
//! [`crate::ws::media_stream_handler`].

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::state::AppState;

pub const MEDIA_STREAM_PATH: &str = "/media-stream";

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

/// Form fields posted by the telephony platform when a call comes in.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IncomingCall {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn connect_twiml(greeting: &str, stream_url: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            "<Say>{greeting}</Say>",
            r#"<Pause length="1"/>"#,
            "<Say>We can chat now</Say>",
            r#"<Connect><Stream url="{url}"/></Connect>"#,
            "</Response>"
        ),
        greeting = escape(greeting),
        url = escape(stream_url),
    )
}

/// Answer an incoming call and connect its audio to the media stream.
#[utoipa::path(
    post,
    path = "/incoming-call",
    request_body(content = IncomingCall, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "TwiML connecting the call to the media stream", body = String, content_type = "application/xml"),
        (status = 400, description = "No public stream URL configured and no Host header", body = ErrorResponse)
    )
)]
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(call): Form<IncomingCall>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        from = call.from.as_deref().unwrap_or("unknown"),
        to = call.to.as_deref().unwrap_or("unknown"),
        "Incoming call."
    );

    let stream_url = match &state.config.public_stream_url {
        Some(url) => url.clone(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ApiError::BadRequest("Host header is required".to_string()))?;
            format!("wss://{}{}", host, MEDIA_STREAM_PATH)
        }
    };

    let body = connect_twiml(&state.config.greeting, &stream_url);
    Ok(([(header::CONTENT_TYPE, "application/xml")], body))
}

/// Report liveness and the number of calls being bridged.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.supervisor.active_sessions(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_twiml_escapes_markup() {
        let twiml = connect_twiml(r#"Tom & Jerry's <"show">"#, "wss://host/media-stream");
        assert!(twiml.contains("<Say>Tom &amp; Jerry&apos;s &lt;&quot;show&quot;&gt;</Say>"));
    }

    #[test]
    fn test_connect_twiml_layout() {
        let twiml = connect_twiml("Hi & welcome", "wss://host/media-stream?a=1&b=2");
        assert_eq!(
            twiml,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<Response><Say>Hi &amp; welcome</Say>",
                r#"<Pause length="1"/><Say>We can chat now</Say>"#,
                r#"<Connect><Stream url="wss://host/media-stream?a=1&amp;b=2"/></Connect>"#,
                "</Response>"
            )
        );
    }
}
