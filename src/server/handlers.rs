use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ocr::{CommandDetector, DetectionSource};
use crate::settings;

use super::models::{ErrorResponse, OcrResponse};
use super::request::{ocr_request, read_upload};
use super::state::ServerState;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let source: Arc<dyn DetectionSource> =
        Arc::new(CommandDetector::initialize(settings.detector.clone())?);
    let app = router(ServerState::new(settings, source));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ocr", post(ocr))
        .route("/api/ocr/advanced", post(ocr_advanced))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "message": "OCR Service is running",
        })),
    )
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn ocr(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ApiResult<OcrResponse> {
    handle_upload(state, multipart, false).await
}

async fn ocr_advanced(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ApiResult<OcrResponse> {
    handle_upload(state, multipart, true).await
}

async fn handle_upload(
    state: Arc<ServerState>,
    multipart: Multipart,
    allow_debug_images: bool,
) -> ApiResult<OcrResponse> {
    let form = read_upload(multipart)
        .await
        .map_err(|err| (err.status, Json(ErrorResponse::new(err.message))))?;
    let result =
        tokio::task::spawn_blocking(move || ocr_request(state.as_ref(), form, allow_debug_images))
            .await
            .map_err(|err| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(format!("server task failed: {}", err))),
                )
            })?;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            warn!("ocr request failed ({}): {}", err.status, err.message);
            Err((err.status, Json(ErrorResponse::new(err.message))))
        }
    }
}
