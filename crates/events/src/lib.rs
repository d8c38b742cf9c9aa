//! Realtime infrastructure for shared evaluation sessions:
//!
//! - [`SessionFeed`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, with per-session filtered subscriptions.
//! - [`SessionEvent`] -- the canonical change-notification envelope.
//! - [`Debouncer`] -- collapses rapid repeated writes into one, with a
//!   deterministic flush on teardown.

pub mod debounce;
pub mod feed;

pub use debounce::Debouncer;
pub use feed::{ChannelState, SessionEvent, SessionEventKind, SessionFeed, SessionSubscription};
