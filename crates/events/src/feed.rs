//! Session change feed backed by a `tokio::sync::broadcast` channel.
//!
//! [`SessionFeed`] is the publish/subscribe hub for [`SessionEvent`]s. It is
//! shared via `Arc<SessionFeed>` across the application; each WebSocket
//! connection holds one [`SessionSubscription`] filtered to its session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tandem_core::session::{ControlFlags, SessionMode};
use tandem_core::types::DbId;

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// What changed on a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// A new session went active for its coach.
    Started,
    /// The session was soft-closed (explicit stop or eviction).
    Ended,
    ModeChanged { mode: SessionMode },
    PositionChanged { position: f64 },
    ControlsChanged { flags: ControlFlags },
}

/// A change notification for a single session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: DbId,
    #[serde(flatten)]
    pub kind: SessionEventKind,
    /// When the event was published (UTC).
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(session_id: DbId, kind: SessionEventKind) -> Self {
        Self {
            session_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionFeed
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out hub for session change events.
///
/// One underlying channel carries events for all sessions; subscriptions
/// filter by session id. Each call to [`subscribe`](SessionFeed::subscribe)
/// creates an independent receiver, so re-subscribing on remount never
/// produces duplicate delivery through an existing subscription.
pub struct SessionFeed {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionFeed {
    /// Create a feed with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow subscribers observe a lag (reported via [`ChannelState::Error`]).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With zero subscribers the event is silently dropped; session state
    /// lives in the store, the feed is notification only.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events for one session.
    pub fn subscribe(&self, session_id: DbId) -> SessionSubscription {
        SessionSubscription {
            session_id,
            rx: self.sender.subscribe(),
            state: ChannelState::Connected,
        }
    }

    /// Current number of subscribers (all sessions).
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// SessionSubscription
// ---------------------------------------------------------------------------

/// Externally observable health of a subscription, so callers can decide
/// whether to fall back to polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connected,
    /// The subscriber lagged and missed events; delivery continues but the
    /// caller should re-read current state from the store.
    Error,
    Closed,
}

/// A filtered receiver for one session's events.
pub struct SessionSubscription {
    session_id: DbId,
    rx: broadcast::Receiver<SessionEvent>,
    state: ChannelState,
}

impl SessionSubscription {
    pub fn session_id(&self) -> DbId {
        self.session_id
    }

    /// Current connection health.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Receive the next event for this session.
    ///
    /// Events for other sessions are skipped. Returns `None` once the feed
    /// is closed (server shutdown). A lag is not fatal: the state flips to
    /// [`ChannelState::Error`] and delivery continues with newer events.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.session_id == self.session_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        session_id = self.session_id,
                        missed,
                        "Session subscription lagged, events dropped"
                    );
                    self.state = ChannelState::Error;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.state = ChannelState::Closed;
                    return None;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
