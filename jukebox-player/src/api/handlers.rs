//! HTTP request handlers
//!
//! Request parsing and error-to-status mapping live here; behavior lives
//! in the controller. Validation failures surface as 400/404 JSON bodies,
//! `ResolutionFailed` on the synchronous search/enqueue paths as 502.
//! Engine and download trouble never produces an error status: those are
//! absorbed into the snapshot's `last_error` field.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jukebox_common::{Error, ErrorKind, StatusSnapshot, TrackProjection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;

/// Default candidate count for free-text search, overridable per request.
const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Upper bound on requested search candidates.
const MAX_SEARCH_LIMIT: usize = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    /// Absent means resume/start-from-front.
    track_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: i64,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    /// Remote URL or local filesystem path.
    reference: String,
    /// Also start a background download/transcode for remote tracks.
    #[serde(default)]
    download: bool,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    from: usize,
    to: usize,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteAddRequest {
    /// Absent means the currently playing track.
    track_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CoverQuery {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    tracks: Vec<TrackProjection>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    results: Vec<TrackProjection>,
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Handler-level failure, rendered as `{"error": message}` JSON.
#[derive(Debug)]
pub enum ApiError {
    /// Controller rejected the command.
    Player(Error),
    /// The request itself was malformed.
    BadRequest(String),
    /// Something on our side that should not happen.
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Player(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Player(err) => {
                let status = match err.kind() {
                    ErrorKind::InvalidIndex => StatusCode::NOT_FOUND,
                    ErrorKind::EmptyQueue => StatusCode::CONFLICT,
                    ErrorKind::UnsupportedFormat => StatusCode::BAD_REQUEST,
                    ErrorKind::ResolutionFailed => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                error!("internal handler error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Reject negative indexes before the lossy cast to usize.
fn parse_index(raw: Option<i64>, field: &str) -> Result<Option<usize>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) if value >= 0 => Ok(Some(value as usize)),
        Some(value) => Err(ApiError::BadRequest(format!(
            "{} must be non-negative, got {}",
            field, value
        ))),
    }
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "jukebox_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: state.port,
    })
}

// ============================================================================
// Player Commands
// ============================================================================

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.controller.status().await)
}

/// POST /api/play
///
/// An absent or empty body resumes (or starts the front of the queue);
/// `{"track_index": n}` starts that slot.
pub async fn play(
    State(state): State<AppState>,
    body: Option<Json<PlayRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let index = parse_index(body.and_then(|Json(req)| req.track_index), "track_index")?;
    Ok(Json(state.controller.play(index).await?))
}

/// POST /api/pause
pub async fn pause(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.pause().await?))
}

/// POST /api/next
pub async fn next(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.next().await?))
}

/// POST /api/previous
pub async fn previous(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.previous().await?))
}

/// POST /api/volume
pub async fn set_volume(
    State(state): State<AppState>,
    body: Option<Json<VolumeRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest(
            "body must be JSON with a \"volume\" field".to_string(),
        ));
    };
    Ok(Json(state.controller.set_volume(req.volume).await?))
}

// ============================================================================
// Queue Management
// ============================================================================

/// GET /api/queue
pub async fn get_queue(State(state): State<AppState>) -> Json<ListResponse> {
    Json(ListResponse {
        tracks: state.controller.queue_list().await,
    })
}

/// POST /api/queue
pub async fn enqueue(
    State(state): State<AppState>,
    body: Option<Json<EnqueueRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest(
            "body must be JSON with a \"reference\" field".to_string(),
        ));
    };
    let reference = req.reference.trim();
    if reference.is_empty() {
        return Err(ApiError::BadRequest("reference must not be empty".to_string()));
    }
    info!(reference, download = req.download, "enqueue requested");
    Ok(Json(
        state
            .controller
            .enqueue_reference(reference, req.download)
            .await?,
    ))
}

/// DELETE /api/queue/{index}
pub async fn remove_from_queue(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.remove_track(index).await?))
}

/// POST /api/queue/move
pub async fn move_in_queue(
    State(state): State<AppState>,
    body: Option<Json<MoveRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest(
            "body must be JSON with \"from\" and \"to\" fields".to_string(),
        ));
    };
    Ok(Json(state.controller.move_track(req.from, req.to).await?))
}

/// POST /api/queue/clear
pub async fn clear_queue(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.clear_queue().await?))
}

/// POST /api/queue/from_history
pub async fn enqueue_from_history(
    State(state): State<AppState>,
    body: Option<Json<IndexRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest(
            "body must be JSON with an \"index\" field".to_string(),
        ));
    };
    Ok(Json(state.controller.enqueue_from_history(req.index).await?))
}

/// POST /api/queue/from_favorites
pub async fn enqueue_from_favorites(
    State(state): State<AppState>,
    body: Option<Json<IndexRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest(
            "body must be JSON with an \"index\" field".to_string(),
        ));
    };
    Ok(Json(
        state.controller.enqueue_from_favorites(req.index).await?,
    ))
}

// ============================================================================
// History and Favorites
// ============================================================================

/// GET /api/history
pub async fn get_history(State(state): State<AppState>) -> Json<ListResponse> {
    Json(ListResponse {
        tracks: state.controller.history_list().await,
    })
}

/// GET /api/favorites
pub async fn get_favorites(State(state): State<AppState>) -> Json<ListResponse> {
    Json(ListResponse {
        tracks: state.controller.favorites_list().await,
    })
}

/// POST /api/favorites
pub async fn add_favorite(
    State(state): State<AppState>,
    body: Option<Json<FavoriteAddRequest>>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let index = parse_index(body.and_then(|Json(req)| req.track_index), "track_index")?;
    Ok(Json(state.controller.add_favorite(index).await?))
}

/// DELETE /api/favorites/{index}
pub async fn remove_favorite(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.controller.remove_favorite(index).await?))
}

// ============================================================================
// Search and Cover Art
// ============================================================================

/// POST /api/search
pub async fn search(
    State(state): State<AppState>,
    body: Option<Json<SearchRequest>>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Some(Json(req)) = body else {
        return Err(ApiError::BadRequest(
            "body must be JSON with a \"query\" field".to_string(),
        ));
    };
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    let limit = req
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let results = state.controller.search(query, limit).await?;
    Ok(Json(SearchResponse { results }))
}

/// GET /api/cover?url=
///
/// Always answers with image bytes: the cached cover when the fetch
/// succeeds (now or earlier), the built-in placeholder otherwise.
pub async fn cover(
    State(state): State<AppState>,
    Query(query): Query<CoverQuery>,
) -> Result<Response, ApiError> {
    let mut path = state.covers.get_or_fetch_url(query.url.as_deref()).await;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        // The cache entry can vanish between resolve and read; the
        // placeholder is materialized at startup and outlives us.
        Err(_) => {
            path = state.covers.placeholder().to_path_buf();
            tokio::fs::read(&path)
                .await
                .map_err(|e| ApiError::Internal(format!("placeholder unreadable: {}", e)))?
        }
    };

    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
