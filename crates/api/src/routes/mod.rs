pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /sessions                      start session (POST, coach)
/// /sessions/active               list all active sessions (GET, public)
/// /sessions/check                coach-scoped session check (GET, coach)
/// /sessions/{id}                 get session with call metadata (GET, public)
/// /sessions/{id}/stop            stop session (POST, coach)
/// /sessions/{id}/mode            update mode (PATCH, coach)
/// /sessions/{id}/controls        update display controls (PATCH, coach)
/// /sessions/{id}/position        debounced position update (PATCH, coach)
/// /sessions/{id}/ws              realtime event stream (WebSocket, public)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Shared evaluation session lifecycle, discovery, and realtime feed.
        .nest("/sessions", sessions::router())
}
