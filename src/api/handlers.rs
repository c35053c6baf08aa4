//! JSON control handlers
//!
//! Thin adapters between HTTP and registry operations. Policy lives in the
//! registry; these functions parse requests, pick defaults, and map
//! [`RegistryError`] onto status codes.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::registry::{now_unix_nanos, RegistryError};

#[derive(Debug, Deserialize)]
pub struct CreateStreamRequest {
    pub stream_id: String,
    pub rtsp_url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct StartWithUrlRequest {
    pub rtsp_url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Map a registry error onto the wire
pub(crate) fn error_response(err: RegistryError) -> Response {
    let status = match &err {
        RegistryError::StreamNotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::StreamAlreadyExists(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RegistryError::StreamNotRunning(_) => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::ConsumerBusy { .. } => StatusCode::CONFLICT,
    };

    let body = match &err {
        RegistryError::ConsumerBusy { client_count, .. } => json!({
            "error": err.to_string(),
            "client_count": client_count,
        }),
        _ => json!({ "error": err.to_string() }),
    };

    (status, Json(body)).into_response()
}

/// Stream id derived from a source URL: stable across calls, unique enough
/// within a deployment.
pub(crate) fn derive_stream_id(rtsp_url: &str) -> String {
    let digest = format!("{:x}", md5::compute(rtsp_url.as_bytes()));
    format!("stream_{}", &digest[..12])
}

fn resolve_dimensions(state: &AppState, width: u32, height: u32) -> (u32, u32) {
    let width = if width == 0 {
        state.config.default_width
    } else {
        width
    };
    let height = if height == 0 {
        state.config.default_height
    } else {
        height
    };
    (width, height)
}

/// `POST /api/streams`
pub async fn create_stream(
    State(state): State<AppState>,
    Json(req): Json<CreateStreamRequest>,
) -> Response {
    let (width, height) = resolve_dimensions(&state, req.width, req.height);

    match state
        .registry
        .create(&req.stream_id, &req.rtsp_url, width, height)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "message": "Stream started successfully",
                "stream_id": req.stream_id,
                "rtsp_url": req.rtsp_url,
                "width": width,
                "height": height,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /api/streams/start-with-url`
///
/// The id is a digest of the URL, so repeated calls for the same camera
/// land on the same stream; an existing stream is reported as success.
pub async fn start_with_url(
    State(state): State<AppState>,
    Json(req): Json<StartWithUrlRequest>,
) -> Response {
    let stream_id = derive_stream_id(&req.rtsp_url);
    let (width, height) = resolve_dimensions(&state, req.width, req.height);

    let created = if state.registry.lookup(&stream_id).await.is_ok() {
        false
    } else {
        match state
            .registry
            .create(&stream_id, &req.rtsp_url, width, height)
            .await
        {
            Ok(()) => true,
            // Lost a create race: the stream exists now, which is what the
            // caller wanted
            Err(RegistryError::StreamAlreadyExists(_)) => false,
            Err(e) => return error_response(e),
        }
    };

    let message = if created {
        "Stream started successfully"
    } else {
        "Stream already running"
    };
    (
        StatusCode::OK,
        Json(json!({
            "message": message,
            "stream_id": stream_id,
            "rtsp_url": req.rtsp_url,
            "width": width,
            "height": height,
        })),
    )
        .into_response()
}

/// `DELETE /api/streams/:stream_id`: refuses while consumers are attached
pub async fn stop_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Response {
    match state.registry.stop(&stream_id, false).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "message": "Stream stopped successfully",
                "stream_id": stream_id,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `DELETE /api/streams/:stream_id/force`: unconditional stop
pub async fn force_stop_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Response {
    match state.registry.stop(&stream_id, true).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "message": "Stream force-stopped successfully",
                "stream_id": stream_id,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/streams`
pub async fn list_streams(State(state): State<AppState>) -> Response {
    let streams = state.registry.list().await;
    Json(json!({ "streams": streams })).into_response()
}

/// `GET /api/streams/:stream_id/stats`
pub async fn stream_stats(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Response {
    match state.registry.stats(&stream_id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/streams/:stream_id/status`
pub async fn stream_status(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Response {
    match state.registry.status(&stream_id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/streams/:stream_id/frame`
///
/// One raw frame, consumed from the pipe. A quiet stream yields 204 rather
/// than an error so polling clients stay simple.
pub async fn latest_frame(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Response {
    match state.registry.latest_frame(&stream_id).await {
        Ok(Some(frame)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (
                    header::HeaderName::from_static("x-frame-timestamp"),
                    now_unix_nanos().to_string(),
                ),
            ],
            frame,
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /health`
pub async fn health() -> Response {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Json(json!({ "status": "healthy", "timestamp": timestamp })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_id_is_deterministic() {
        let a = derive_stream_id("rtsp://camera.example/stream1");
        let b = derive_stream_id("rtsp://camera.example/stream1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_derived_id_shape() {
        let id = derive_stream_id("rtsp://x");
        assert!(id.starts_with("stream_"));
        assert_eq!(id.len(), "stream_".len() + 12);
        assert!(id["stream_".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derived_id_differs_per_url() {
        assert_ne!(
            derive_stream_id("rtsp://camera.example/1"),
            derive_stream_id("rtsp://camera.example/2")
        );
    }
}
