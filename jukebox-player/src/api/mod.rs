//! HTTP surface of the daemon
//!
//! Thin translation layer: handlers parse the request, call one
//! controller method and serialize the result. Every mutating player
//! endpoint returns the same status snapshot a `GET /api/status` would,
//! so clients never need a follow-up poll to learn what happened.

pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::controller::PlayerController;
use crate::covers::CoverArtCache;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PlayerController>,
    pub covers: Arc<CoverArtCache>,
    /// Server port, echoed by the health endpoint
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Player commands
        .route("/api/status", get(handlers::status))
        .route("/api/play", post(handlers::play))
        .route("/api/pause", post(handlers::pause))
        .route("/api/next", post(handlers::next))
        .route("/api/previous", post(handlers::previous))
        .route("/api/volume", post(handlers::set_volume))
        // Queue management
        .route("/api/queue", get(handlers::get_queue))
        .route("/api/queue", post(handlers::enqueue))
        .route("/api/queue/:index", delete(handlers::remove_from_queue))
        .route("/api/queue/move", post(handlers::move_in_queue))
        .route("/api/queue/clear", post(handlers::clear_queue))
        .route("/api/queue/from_history", post(handlers::enqueue_from_history))
        .route("/api/queue/from_favorites", post(handlers::enqueue_from_favorites))
        // Lists
        .route("/api/history", get(handlers::get_history))
        .route("/api/favorites", get(handlers::get_favorites))
        .route("/api/favorites", post(handlers::add_favorite))
        .route("/api/favorites/:index", delete(handlers::remove_favorite))
        // Provider search and cover art
        .route("/api/search", post(handlers::search))
        .route("/api/cover", get(handlers::cover))
        .with_state(state)
        // Local-network clients (the shell, curl) get unrestricted CORS
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
