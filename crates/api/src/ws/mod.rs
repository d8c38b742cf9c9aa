//! WebSocket infrastructure for realtime session viewing.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::session_ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
