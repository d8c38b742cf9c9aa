//! Session lifecycle manager: every mutation of session rows goes through
//! here, and the one-active-session-per-coach invariant is enforced here.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use tandem_core::error::CoreError;
use tandem_core::session::{self, ControlFlags, SessionMode};
use tandem_core::types::{DbId, Timestamp};
use tandem_db::models::live_session::{CreateLiveSession, LiveSession};
use tandem_db::SessionStore;
use tandem_events::{SessionEvent, SessionEventKind, SessionFeed};

use crate::error::AppResult;
use crate::live::broadcast::RealtimeBroadcaster;

/// Result of a coach-scoped discovery query.
///
/// Carries a presence flag plus query metadata so callers can distinguish
/// "confirmed no session" from a failed query (failures surface as errors,
/// never as an empty success).
#[derive(Debug, Serialize)]
pub struct SessionCheck {
    pub active: bool,
    pub session: Option<LiveSession>,
    /// Total matching rows. Should be 0 or 1 under correct operation; a
    /// larger count is reported as-is, not repaired.
    pub active_count: usize,
    pub method: &'static str,
    pub checked_at: Timestamp,
}

/// Coach-scoped session state machine: `NO_ACTIVE_SESSION` ⇄
/// `ONE_ACTIVE_SESSION`.
///
/// `start` is legal from either state -- from `ONE_ACTIVE_SESSION` it evicts
/// the competing session(s) rather than rejecting, then verifies zero remain
/// before inserting and re-verifies exactly one exists after. Any other
/// observed count is surfaced as a fatal consistency violation. The partial
/// unique index on the table backs this up at the store layer, closing the
/// window between verification and insert.
pub struct LiveSessionManager<S> {
    store: Arc<S>,
    broadcaster: RealtimeBroadcaster<S>,
}

impl<S: SessionStore + 'static> LiveSessionManager<S> {
    pub fn new(store: Arc<S>, feed: Arc<SessionFeed>) -> Self {
        let broadcaster = RealtimeBroadcaster::new(Arc::clone(&store), feed);
        Self { store, broadcaster }
    }

    /// Override the position debounce window (tests).
    #[cfg(test)]
    pub fn with_debounce_window(
        store: Arc<S>,
        feed: Arc<SessionFeed>,
        window: std::time::Duration,
    ) -> Self {
        let broadcaster = RealtimeBroadcaster::with_window(Arc::clone(&store), feed, window);
        Self { store, broadcaster }
    }

    /// Fetch a session or report NotFound.
    pub async fn session(&self, id: DbId) -> AppResult<LiveSession> {
        Ok(self
            .store
            .get(id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "session",
                id,
            })?)
    }

    /// Start a new session for a coach, evicting any session already active.
    ///
    /// Sequence: verify/evict competing sessions, re-verify zero remain,
    /// insert (`is_active = true, session_mode = 'paused', audio_position =
    /// 0`), re-verify exactly one active row exists. A failed verification
    /// is a consistency violation and fails the operation even though
    /// earlier writes succeeded.
    pub async fn start(
        &self,
        coach_user_id: DbId,
        call_id: DbId,
        session_name: String,
    ) -> AppResult<LiveSession> {
        let competing = self.store.active_for_coach(coach_user_id).await?;
        if !competing.is_empty() {
            tracing::info!(
                coach_id = coach_user_id,
                evicted = competing.len(),
                "Evicting active session(s) before start"
            );
            for session in &competing {
                self.broadcaster.teardown(session.id).await;
            }
            self.store.end_all_for_coach(coach_user_id).await?;

            let remaining = self.store.count_active_for_coach(coach_user_id).await?;
            if remaining != 0 {
                return Err(CoreError::Consistency(format!(
                    "{remaining} session(s) for coach {coach_user_id} still active after eviction"
                ))
                .into());
            }
            for session in &competing {
                self.broadcaster
                    .publish(SessionEvent::new(session.id, SessionEventKind::Ended));
            }
        }

        let input = CreateLiveSession {
            coach_user_id,
            call_id,
            session_name,
        };
        let created = match self.store.insert(&input).await {
            Ok(created) => created,
            Err(e) if e.is_active_session_conflict() => {
                return Err(CoreError::Conflict(format!(
                    "another session for coach {coach_user_id} went active concurrently"
                ))
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let count = self.store.count_active_for_coach(coach_user_id).await?;
        if count != 1 {
            return Err(CoreError::Consistency(format!(
                "expected exactly 1 active session for coach {coach_user_id} after start, found {count}"
            ))
            .into());
        }

        tracing::info!(
            session_id = created.id,
            coach_id = coach_user_id,
            call_id,
            "Session started"
        );
        self.broadcaster
            .publish(SessionEvent::new(created.id, SessionEventKind::Started));
        Ok(created)
    }

    /// Stop a session. Idempotent: stopping an already-ended session
    /// succeeds without error and without a duplicate Ended event.
    pub async fn stop(&self, id: DbId) -> AppResult<LiveSession> {
        let before = self.session(id).await?;
        let after = self.store.end(id).await?.ok_or(CoreError::NotFound {
            entity: "session",
            id,
        })?;

        // Read-after-write check: the row must have actually closed.
        if after.is_active {
            return Err(
                CoreError::Consistency(format!("session {id} still active after stop")).into(),
            );
        }

        self.broadcaster.teardown(id).await;
        if before.is_active {
            tracing::info!(session_id = id, "Session stopped");
            self.broadcaster
                .publish(SessionEvent::new(id, SessionEventKind::Ended));
        }
        Ok(after)
    }

    /// Update the session mode. The mode is validated by the caller (parse)
    /// before any store access; this never touches `is_active`.
    pub async fn update_mode(&self, id: DbId, mode: SessionMode) -> AppResult<LiveSession> {
        let updated = self
            .store
            .set_mode(id, mode)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "session",
                id,
            })?;
        self.broadcaster
            .publish(SessionEvent::new(id, SessionEventKind::ModeChanged { mode }));
        Ok(updated)
    }

    /// Apply a partial display-control update. Rejected when no recognized
    /// key survived filtering.
    pub async fn update_controls(&self, id: DbId, flags: ControlFlags) -> AppResult<LiveSession> {
        if flags.is_empty() {
            return Err(CoreError::Validation(
                "no recognized control fields in update".into(),
            )
            .into());
        }
        let updated = self
            .store
            .set_controls(id, &flags)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "session",
                id,
            })?;
        self.broadcaster.publish(SessionEvent::new(
            id,
            SessionEventKind::ControlsChanged { flags },
        ));
        Ok(updated)
    }

    /// Submit a debounced playback-position update.
    ///
    /// Validation happens before any store access. Returns the current row;
    /// the committed position trails it by up to one debounce window. A
    /// position arriving for a session that has since ended is a silent
    /// no-op at commit time.
    pub async fn update_position(&self, id: DbId, position: f64) -> AppResult<LiveSession> {
        session::validate_position(position)?;
        let current = self.session(id).await?;
        self.broadcaster.update_position(id, position).await?;
        Ok(current)
    }

    /// Coach-scoped discovery: all active sessions for the coach, most
    /// recent first. More than one match is reported, not repaired.
    pub async fn check_for_coach(&self, coach_user_id: DbId) -> AppResult<SessionCheck> {
        let mut sessions = self.store.active_for_coach(coach_user_id).await?;
        let active_count = sessions.len();
        if active_count > 1 {
            tracing::warn!(
                coach_id = coach_user_id,
                active_count,
                "Coach has multiple active sessions (invariant breach), returning first"
            );
        }
        let session = if sessions.is_empty() {
            None
        } else {
            Some(sessions.remove(0))
        };
        Ok(SessionCheck {
            active: session.is_some(),
            session,
            active_count,
            method: "by_coach",
            checked_at: Utc::now(),
        })
    }

    /// Coach-scoped discovery filtered to one call. Coach scoping is
    /// mandatory: another coach's session on the same call is invisible.
    pub async fn check_for_call(&self, coach_user_id: DbId, call_id: DbId) -> AppResult<SessionCheck> {
        let session = self.store.active_for_call(coach_user_id, call_id).await?;
        Ok(SessionCheck {
            active: session.is_some(),
            active_count: usize::from(session.is_some()),
            session,
            method: "by_call",
            checked_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use assert_matches::assert_matches;

    use crate::error::AppError;
    use crate::live::memory::MemoryStore;

    const COACH: DbId = 1;
    const OTHER_COACH: DbId = 2;
    const CALL: DbId = 42;

    fn manager(store: Arc<MemoryStore>) -> LiveSessionManager<MemoryStore> {
        LiveSessionManager::with_debounce_window(
            store,
            Arc::new(SessionFeed::default()),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn start_creates_paused_active_session_at_position_zero() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();

        assert!(session.is_active);
        assert_eq!(session.session_mode, SessionMode::Paused);
        assert_eq!(session.audio_position, 0.0);
        assert_eq!(session.coach_user_id, COACH);
        assert_eq!(session.call_id, CALL);
        assert_eq!(store.active_count(COACH), 1);
    }

    #[tokio::test]
    async fn start_evicts_competing_session() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let first = mgr.start(COACH, CALL, "A".into()).await.unwrap();
        let second = mgr.start(COACH, 43, "B".into()).await.unwrap();

        let evicted = store.get_row(first.id).unwrap();
        assert!(!evicted.is_active);
        assert_eq!(evicted.session_mode, SessionMode::Ended);
        assert!(second.is_active);
        assert_eq!(second.session_mode, SessionMode::Paused);
        assert_eq!(store.active_count(COACH), 1);
    }

    #[tokio::test]
    async fn repeated_starts_leave_exactly_one_active() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        for i in 0..5 {
            mgr.start(COACH, CALL + i, format!("S{i}")).await.unwrap();
            assert_eq!(store.active_count(COACH), 1);
        }
    }

    #[tokio::test]
    async fn concurrent_starts_never_leave_two_active() {
        let store = Arc::new(MemoryStore::new());
        let mgr = Arc::new(manager(Arc::clone(&store)));

        let a = tokio::spawn({
            let mgr = Arc::clone(&mgr);
            async move { mgr.start(COACH, CALL, "tab A".into()).await }
        });
        let b = tokio::spawn({
            let mgr = Arc::clone(&mgr);
            async move { mgr.start(COACH, CALL, "tab B".into()).await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        // One of the two may lose the race with a Conflict, but the
        // invariant must hold and at least one start must have won.
        assert!(a.is_ok() || b.is_ok());
        assert_eq!(store.active_count(COACH), 1);
    }

    #[tokio::test]
    async fn coaches_do_not_evict_each_other() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        mgr.start(COACH, CALL, "A".into()).await.unwrap();
        mgr.start(OTHER_COACH, CALL, "B".into()).await.unwrap();

        assert_eq!(store.active_count(COACH), 1);
        assert_eq!(store.active_count(OTHER_COACH), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();

        let first = mgr.stop(session.id).await.unwrap();
        assert!(!first.is_active);
        assert_eq!(first.session_mode, SessionMode::Ended);

        let second = mgr.stop(session.id).await.unwrap();
        assert!(!second.is_active);
    }

    #[tokio::test]
    async fn stop_unknown_session_reports_not_found() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store);

        let err = mgr.stop(999).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn eviction_failure_is_a_consistency_violation() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        // A row the backend refuses to close, simulating a store that loses
        // the eviction write.
        let stuck = store.seed_active(COACH, CALL, "stuck");
        store.mark_sticky(stuck.id);

        let err = mgr.start(COACH, 43, "B".into()).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::Consistency(_)));
    }

    #[tokio::test]
    async fn still_active_after_stop_is_a_consistency_violation() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let stuck = store.seed_active(COACH, CALL, "stuck");
        store.mark_sticky(stuck.id);

        let err = mgr.stop(stuck.id).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::Consistency(_)));
    }

    #[tokio::test]
    async fn update_mode_changes_row_but_not_activity() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        let updated = mgr.update_mode(session.id, SessionMode::Live).await.unwrap();

        assert_eq!(updated.session_mode, SessionMode::Live);
        assert!(updated.is_active);
    }

    #[tokio::test]
    async fn update_controls_applies_partial_update() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        let flags = ControlFlags {
            show_participant_tops: Some(true),
            ..Default::default()
        };
        let updated = mgr.update_controls(session.id, flags).await.unwrap();

        assert!(updated.show_participant_tops);
        // Untouched flags keep their defaults.
        assert!(!updated.show_tops_realtime);
        assert!(!updated.anonymous_mode);
    }

    #[tokio::test]
    async fn empty_controls_update_is_rejected_before_store_access() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        let err = mgr
            .update_controls(session.id, ControlFlags::default())
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn negative_position_rejected_without_mutation() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        let err = mgr.update_position(session.id, -1.0).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::Validation(_)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get_row(session.id).unwrap().audio_position, 0.0);
        assert_eq!(store.position_writes(), 0);
    }

    #[tokio::test]
    async fn position_burst_collapses_to_single_write_with_last_value() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        mgr.update_position(session.id, 1.0).await.unwrap();
        mgr.update_position(session.id, 2.0).await.unwrap();
        mgr.update_position(session.id, 3.0).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.position_writes(), 1);
        assert_eq!(store.get_row(session.id).unwrap().audio_position, 3.0);
    }

    #[tokio::test]
    async fn position_update_after_stop_is_a_silent_no_op() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        mgr.stop(session.id).await.unwrap();

        // The row still exists, so the update is accepted; the commit is
        // skipped by the is_active guard.
        mgr.update_position(session.id, 10.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.position_writes(), 0);
        assert_eq!(store.get_row(session.id).unwrap().audio_position, 0.0);
    }

    #[tokio::test]
    async fn stop_discards_pending_position_via_active_guard() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        mgr.update_position(session.id, 55.0).await.unwrap();
        mgr.stop(session.id).await.unwrap();

        // Teardown flushes after the row has closed, so the pending value
        // runs into the is_active guard and is discarded, not committed.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.position_writes(), 0);
        assert_eq!(store.get_row(session.id).unwrap().audio_position, 0.0);
        assert!(!store.get_row(session.id).unwrap().is_active);
    }

    #[tokio::test]
    async fn check_for_coach_reports_presence_and_count() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        let none = mgr.check_for_coach(COACH).await.unwrap();
        assert!(!none.active);
        assert_eq!(none.active_count, 0);
        assert_eq!(none.method, "by_coach");

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        let found = mgr.check_for_coach(COACH).await.unwrap();
        assert!(found.active);
        assert_eq!(found.active_count, 1);
        assert_eq!(found.session.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn check_for_coach_with_multiple_active_returns_first_and_reports_count() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        // Invariant breach injected directly into the store.
        store.seed_active(COACH, CALL, "older");
        store.seed_active(COACH, 43, "newer");

        let check = mgr.check_for_coach(COACH).await.unwrap();
        assert!(check.active);
        assert_eq!(check.active_count, 2);
        // Most recent first.
        assert_eq!(check.session.unwrap().session_name, "newer");
    }

    #[tokio::test]
    async fn check_for_call_is_coach_scoped() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(Arc::clone(&store));

        mgr.start(COACH, CALL, "Mine".into()).await.unwrap();
        mgr.start(OTHER_COACH, CALL, "Theirs".into()).await.unwrap();

        let check = mgr.check_for_call(COACH, CALL).await.unwrap();
        assert!(check.active);
        assert_eq!(check.method, "by_call");
        assert_eq!(check.session.unwrap().session_name, "Mine");

        let miss = mgr.check_for_call(COACH, 99).await.unwrap();
        assert!(!miss.active);
        assert!(miss.session.is_none());
    }

    #[tokio::test]
    async fn lifecycle_events_reach_subscribers() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(SessionFeed::default());
        let mgr = LiveSessionManager::with_debounce_window(
            Arc::clone(&store),
            Arc::clone(&feed),
            Duration::from_millis(20),
        );

        let session = mgr.start(COACH, CALL, "Demo".into()).await.unwrap();
        let mut sub = feed.subscribe(session.id);

        mgr.update_mode(session.id, SessionMode::Live).await.unwrap();
        let event = sub.next().await.unwrap();
        assert_matches!(
            event.kind,
            tandem_events::SessionEventKind::ModeChanged {
                mode: SessionMode::Live
            }
        );

        mgr.stop(session.id).await.unwrap();
        let event = sub.next().await.unwrap();
        assert_matches!(event.kind, tandem_events::SessionEventKind::Ended);
    }
}
