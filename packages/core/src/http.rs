//! HTTP boundary of the gateway.
//!
//! `POST /recognize` takes a multipart upload and streams back the MusicXML
//! file; `GET /health` reports engine availability.

use std::collections::BTreeMap;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use log::error;
use serde::Serialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;

use crate::engine::RecognitionEngine;
use crate::models::{EngineError, ErrorKind};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: RecognitionEngine,
}

impl AppState {
    pub fn new(engine: RecognitionEngine) -> Self {
        Self { engine }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.engine.config().max_upload_bytes;

    Router::new()
        .route("/recognize", post(recognize))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error returned by the handlers, rendered as
/// `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request that never reached the engine (400)
    BadRequest(String),
    Engine(EngineError),
    /// The recognition task itself died (500)
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnsupportedFormat => StatusCode::BAD_REQUEST,
        ErrorKind::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST".to_string(), msg),
            ApiError::Engine(err) => {
                let kind = err.kind();
                (status_for(kind), kind.to_string(), err.to_string())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR".to_string(), msg),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

struct Upload {
    filename: String,
    data: Bytes,
    engine: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut engine = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("The file part has no filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, data));
            }
            Some("engine") | Some("backend") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read engine field: {}", e)))?;
                engine = Some(value);
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::BadRequest("Missing multipart part 'file'".into()))?;
    Ok(Upload { filename, data, engine })
}

/// POST /recognize
async fn recognize(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let engine = state.engine.clone();

    // Run detached from the connection: a client that hangs up neither kills
    // the engine nor skips the failure cleanup.
    let handle = tokio::spawn(async move {
        engine
            .recognize_selector(&upload.data, &upload.filename, upload.engine.as_deref())
            .await
    })
    .await
    .map_err(|e| {
        error!("Recognition task failed: {}", e);
        ApiError::Internal(format!("Recognition task failed: {}", e))
    })??;

    let file = state.engine.open_result(&handle).await?;

    let disposition = format!("attachment; filename=\"{}\"", handle.file_name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, handle.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_workspaces: usize,
    pub engines: BTreeMap<String, bool>,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_workspaces: state.engine.active_workspaces().await,
        engines: state.engine.engine_status(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::UnsupportedFormat), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::EngineUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        for kind in [
            ErrorKind::Timeout,
            ErrorKind::EngineExecution,
            ErrorKind::NoArtifactProduced,
            ErrorKind::Storage,
            ErrorKind::Config,
        ] {
            assert_eq!(status_for(kind), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_wrapped_errors_keep_their_status() {
        let err = EngineError::EngineUnavailable("homr".into()).into_processing();
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = EngineError::Timeout(Duration::from_secs(600)).into_processing();
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
