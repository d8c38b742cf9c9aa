//! Route definitions for shared evaluation sessions.
//!
//! Static segments (`/active`, `/check`) are registered alongside `/{id}`;
//! axum matches the literal segments first.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;
use crate::ws;

/// Session routes mounted at `/sessions`.
///
/// ```text
/// POST   /                  -> start_session (coach)
/// GET    /active            -> list_active_sessions (public)
/// GET    /check             -> check_sessions (coach)
/// GET    /{id}              -> get_session (public)
/// POST   /{id}/stop         -> stop_session (coach)
/// PATCH  /{id}/mode         -> update_mode (coach)
/// PATCH  /{id}/controls     -> update_controls (coach)
/// PATCH  /{id}/position     -> update_position (coach)
/// GET    /{id}/ws           -> session_ws_handler (public)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sessions::start_session))
        .route("/active", get(sessions::list_active_sessions))
        .route("/check", get(sessions::check_sessions))
        .route("/{id}", get(sessions::get_session))
        .route("/{id}/stop", post(sessions::stop_session))
        .route("/{id}/mode", patch(sessions::update_mode))
        .route("/{id}/controls", patch(sessions::update_controls))
        .route("/{id}/position", patch(sessions::update_position))
        .route("/{id}/ws", get(ws::session_ws_handler))
}
