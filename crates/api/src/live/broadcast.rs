//! Realtime broadcast channel: pushes session state changes to the feed,
//! debouncing the high-frequency playback-position field.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::RwLock;

use tandem_core::session::{self, POSITION_DEBOUNCE_MS};
use tandem_core::types::DbId;
use tandem_db::SessionStore;
use tandem_events::{Debouncer, SessionEvent, SessionEventKind, SessionFeed};

use crate::error::AppResult;

/// Publishes session changes to the [`SessionFeed`].
///
/// Low-frequency changes (mode, display flags, lifecycle) are published
/// immediately by the lifecycle manager through [`publish`]. Position
/// updates go through a per-session [`Debouncer`]: only the final value in
/// each 150 ms quiet window is committed, and the commit itself is
/// conditioned on the row still being active -- a position arriving after a
/// concurrent stop is a silent no-op.
///
/// [`publish`]: RealtimeBroadcaster::publish
pub struct RealtimeBroadcaster<S> {
    store: Arc<S>,
    feed: Arc<SessionFeed>,
    window: Duration,
    debouncers: RwLock<HashMap<DbId, Arc<Debouncer<f64>>>>,
}

impl<S: SessionStore + 'static> RealtimeBroadcaster<S> {
    pub fn new(store: Arc<S>, feed: Arc<SessionFeed>) -> Self {
        Self::with_window(store, feed, Duration::from_millis(POSITION_DEBOUNCE_MS))
    }

    /// Override the debounce window (tests).
    pub fn with_window(store: Arc<S>, feed: Arc<SessionFeed>, window: Duration) -> Self {
        Self {
            store,
            feed,
            window,
            debouncers: RwLock::new(HashMap::new()),
        }
    }

    /// Immediately publish a low-frequency change notification.
    pub fn publish(&self, event: SessionEvent) {
        self.feed.publish(event);
    }

    /// Submit a playback position for debounced commit.
    ///
    /// Validation happens here, before any store access; the write itself
    /// happens asynchronously when the quiet window elapses.
    pub async fn update_position(&self, session_id: DbId, position: f64) -> AppResult<()> {
        session::validate_position(position)?;
        self.debouncer_for(session_id).await.submit(position);
        Ok(())
    }

    /// Flush and drop the session's debouncer (session stopped). The flushed
    /// write still runs through the `is_active` guard, so a position racing
    /// a stop is discarded by the store, not committed.
    pub async fn teardown(&self, session_id: DbId) {
        let debouncer = self.debouncers.write().await.remove(&session_id);
        if let Some(debouncer) = debouncer {
            debouncer.flush().await;
        }
    }

    async fn debouncer_for(&self, session_id: DbId) -> Arc<Debouncer<f64>> {
        if let Some(existing) = self.debouncers.read().await.get(&session_id) {
            return Arc::clone(existing);
        }

        let mut debouncers = self.debouncers.write().await;
        // Re-check under the write lock; another task may have won the race.
        if let Some(existing) = debouncers.get(&session_id) {
            return Arc::clone(existing);
        }

        let store = Arc::clone(&self.store);
        let feed = Arc::clone(&self.feed);
        let debouncer = Arc::new(Debouncer::new(
            self.window,
            Box::new(move |position: f64| {
                let store = Arc::clone(&store);
                let feed = Arc::clone(&feed);
                async move {
                    match store.set_position_if_active(session_id, position).await {
                        Ok(true) => {
                            feed.publish(SessionEvent::new(
                                session_id,
                                SessionEventKind::PositionChanged { position },
                            ));
                        }
                        Ok(false) => {
                            tracing::debug!(
                                session_id,
                                position,
                                "Position write skipped, session no longer active"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(session_id, error = %e, "Debounced position write failed");
                        }
                    }
                }
                .boxed()
            }),
        ));
        debouncers.insert(session_id, Arc::clone(&debouncer));
        debouncer
    }
}
