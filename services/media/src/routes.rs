use crate::auth::{require_sign_in, AuthUser, JwtVerifier};
use crate::config::{ApiConfig, UploadConfig};
use crate::error::{MediaError, MediaResult};
use crate::media::{MediaRecord, MediaUpdate};
use crate::media_service::{Delivery, MediaService, UploadRequest, UploadedFile};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub media: Arc<MediaService>,
    pub verifier: Arc<JwtVerifier>,
}

/// Response envelope for every media endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<MediaRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn ok(message: &str) -> Self {
        Self {
            message: message.to_string(),
            success: true,
            files: None,
            error: None,
        }
    }

    fn with_files(message: &str, files: Vec<MediaRecord>) -> Self {
        Self {
            files: Some(files),
            ..Self::ok(message)
        }
    }
}

/// Body of an edit request
#[derive(Debug, Default, Deserialize)]
pub struct EditRequest {
    pub keywords: Option<String>,
    #[serde(alias = "visible")]
    pub visibility: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState, api: &ApiConfig, upload: &UploadConfig) -> Router {
    let cors = if api.cors_enabled {
        if api.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = api
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let public = Router::new()
        .route("/media/get/*filename", get(get_media))
        .route("/media/get-all", get(get_all))
        .route("/media/search/:keyword", get(search_media))
        .route("/media/more-files/:page", get(more_files))
        .route("/media/download/*filename", get(download_media));

    let signed_in = Router::new()
        .route(
            "/media/upload",
            post(upload_media).layer(DefaultBodyLimit::max(upload.max_file_size_bytes)),
        )
        .route("/media/get-user-media", get(get_user_media))
        .route("/media/delete/:id", delete(delete_media))
        .route("/media/edit/:id", put(edit_media))
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            require_sign_in,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api/v1", public.merge(signed_in))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "media-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.media.store().ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

fn found(url: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

fn parse_id(raw: &str) -> MediaResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| MediaError::validation("Invalid media id."))
}

/// Multipart upload: `file`, `keywords`, `visible`
#[instrument(skip(state, multipart), fields(owner_id = %user.0))]
async fn upload_media(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse>), MediaError> {
    let mut request = UploadRequest {
        owner_id: Some(user.0),
        ..Default::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MediaError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(String::from);
                let content_type = field.content_type().map(String::from);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| MediaError::validation(e.body_text()))?;
                request.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            "keywords" => {
                request.keywords = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| MediaError::validation(e.body_text()))?,
                );
            }
            "visible" => {
                request.visibility = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| MediaError::validation(e.body_text()))?,
                );
            }
            _ => {}
        }
    }

    let record = state.media.upload(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_files(
            "Media uploaded successfully.",
            vec![record],
        )),
    ))
}

/// Redirect to an object, or stream a byte range of a video
async fn get_media(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, MediaError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    match state.media.retrieve(&filename, range).await? {
        Delivery::Redirect(url) => Ok(found(url)),
        Delivery::Partial {
            range,
            content_type,
            body,
        } => Ok((
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_RANGE, range.content_range()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, range.content_length().to_string()),
                (header::CONTENT_TYPE, content_type),
            ],
            Body::from_stream(body),
        )
            .into_response()),
    }
}

async fn download_media(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, MediaError> {
    let url = state.media.download_url(&filename).await?;
    Ok(found(url))
}

async fn get_all(State(state): State<AppState>) -> Result<Json<ApiResponse>, MediaError> {
    let files = state.media.list_public().await?;
    Ok(Json(ApiResponse::with_files("Media retrieved.", files)))
}

async fn get_user_media(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse>, MediaError> {
    let files = state.media.list_by_owner(user.0).await?;
    Ok(Json(ApiResponse::with_files("Media retrieved.", files)))
}

async fn search_media(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
) -> Result<Json<ApiResponse>, MediaError> {
    let files = state.media.search(&keyword).await?;
    Ok(Json(ApiResponse::with_files("Searched files found.", files)))
}

async fn more_files(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> Result<Json<ApiResponse>, MediaError> {
    let page: i64 = page
        .trim()
        .parse()
        .map_err(|_| MediaError::validation("Page must be a positive number."))?;

    let files = state.media.page(page).await?;
    Ok(Json(ApiResponse::with_files("More files retrieved.", files)))
}

async fn delete_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, MediaError> {
    state.media.delete(parse_id(&id)?, user.0).await?;
    Ok(Json(ApiResponse::ok("Media deleted successfully.")))
}

async fn edit_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<EditRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, MediaError> {
    let id = parse_id(&id)?;
    let Json(body) = body.map_err(|e| MediaError::validation(e.body_text()))?;

    let update = MediaUpdate::from_raw(body.keywords.as_deref(), body.visibility.as_deref())?;
    let record = state.media.edit(id, user.0, update).await?;

    Ok(Json(ApiResponse::with_files(
        "Media details updated.",
        vec![record],
    )))
}

/// Start the API server, returning once `shutdown` resolves
pub async fn start_api_server<F>(
    state: AppState,
    api: &ApiConfig,
    upload: &UploadConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state, api, upload);
    let addr = format!("{}:{}", api.host, api.port);

    info!(address = %addr, "Starting media API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
