//! Shared-evaluation-session coordination: lifecycle manager and realtime
//! broadcaster.
//!
//! The lifecycle manager owns every mutation of session rows and enforces
//! the one-active-session-per-coach invariant; the broadcaster makes
//! successful writes visible to subscribers, debouncing the high-frequency
//! playback-position field.

pub mod broadcast;
pub mod manager;

#[cfg(test)]
pub(crate) mod memory;

pub use broadcast::RealtimeBroadcaster;
pub use manager::LiveSessionManager;
