use std::sync::Arc;

use crate::config::ServerConfig;
use crate::live::LiveSessionManager;
use crate::ws::WsManager;
use tandem_db::PgSessionStore;
use tandem_events::SessionFeed;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`). Everything here is constructed once at startup and reused for
/// the life of the process.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: tandem_db::DbPool,
    /// Server configuration (read by the auth extractor and middleware).
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (participant viewers).
    pub ws_manager: Arc<WsManager>,
    /// Realtime session change feed.
    pub feed: Arc<SessionFeed>,
    /// Session lifecycle manager; the only writer of session rows.
    pub live: Arc<LiveSessionManager<PgSessionStore>>,
}
