//! In-memory [`SessionStore`] used by lifecycle manager tests.
//!
//! Mirrors the Postgres store's semantics, including the partial unique
//! index on `(coach_user_id) WHERE is_active`. Rows can be marked "sticky"
//! to simulate a backend that loses close writes, which is how the
//! consistency-violation paths are exercised.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use tandem_core::session::{ControlFlags, SessionMode};
use tandem_core::types::DbId;
use tandem_db::models::live_session::{CreateLiveSession, LiveSession};
use tandem_db::{SessionStore, StoreError};

#[derive(Default)]
struct Inner {
    rows: Vec<LiveSession>,
    next_id: DbId,
    sticky: HashSet<DbId>,
    position_writes: usize,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn make_row(inner: &mut Inner, coach_user_id: DbId, call_id: DbId, name: &str) -> LiveSession {
        let id = inner.next_id;
        inner.next_id += 1;
        LiveSession {
            id,
            coach_user_id,
            call_id,
            session_name: name.to_string(),
            session_mode: SessionMode::Paused,
            is_active: true,
            audio_position: 0.0,
            show_participant_tops: false,
            show_tops_realtime: false,
            anonymous_mode: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Inject an active row directly, bypassing the unique check (used to
    /// stage invariant breaches).
    pub fn seed_active(&self, coach_user_id: DbId, call_id: DbId, name: &str) -> LiveSession {
        let mut inner = self.inner.lock().unwrap();
        let row = Self::make_row(&mut inner, coach_user_id, call_id, name);
        inner.rows.push(row.clone());
        row
    }

    /// Make a row immune to close writes (`end` / `end_all_for_coach`).
    pub fn mark_sticky(&self, id: DbId) {
        self.inner.lock().unwrap().sticky.insert(id);
    }

    pub fn get_row(&self, id: DbId) -> Option<LiveSession> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn active_count(&self, coach_user_id: DbId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|r| r.coach_user_id == coach_user_id && r.is_active)
            .count()
    }

    /// Number of committed position writes (for debounce-collapse asserts).
    pub fn position_writes(&self) -> usize {
        self.inner.lock().unwrap().position_writes
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, input: &CreateLiveSession) -> Result<LiveSession, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .rows
            .iter()
            .any(|r| r.coach_user_id == input.coach_user_id && r.is_active)
        {
            return Err(StoreError::Backend(
                "duplicate key value violates unique constraint \
                 \"uq_shared_evaluation_sessions_active_coach\""
                    .into(),
            ));
        }
        let row = Self::make_row(
            &mut inner,
            input.coach_user_id,
            input.call_id,
            &input.session_name,
        );
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: DbId) -> Result<Option<LiveSession>, StoreError> {
        Ok(self.get_row(id))
    }

    async fn active_for_coach(&self, coach_user_id: DbId) -> Result<Vec<LiveSession>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<_> = inner
            .rows
            .iter()
            .filter(|r| r.coach_user_id == coach_user_id && r.is_active)
            .cloned()
            .collect();
        // Most recent first, matching the repository's ORDER BY.
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn active_for_call(
        &self,
        coach_user_id: DbId,
        call_id: DbId,
    ) -> Result<Option<LiveSession>, StoreError> {
        let rows = self.active_for_coach(coach_user_id).await?;
        Ok(rows.into_iter().find(|r| r.call_id == call_id))
    }

    async fn count_active_for_coach(&self, coach_user_id: DbId) -> Result<i64, StoreError> {
        Ok(self.active_count(coach_user_id) as i64)
    }

    async fn end_all_for_coach(&self, coach_user_id: DbId) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let sticky = inner.sticky.clone();
        let mut closed = 0;
        for row in inner
            .rows
            .iter_mut()
            .filter(|r| r.coach_user_id == coach_user_id && r.is_active)
        {
            if sticky.contains(&row.id) {
                continue;
            }
            row.is_active = false;
            row.session_mode = SessionMode::Ended;
            row.updated_at = Utc::now();
            closed += 1;
        }
        Ok(closed)
    }

    async fn end(&self, id: DbId) -> Result<Option<LiveSession>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let sticky = inner.sticky.contains(&id);
        let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if !sticky {
            row.is_active = false;
            row.session_mode = SessionMode::Ended;
            row.updated_at = Utc::now();
        }
        Ok(Some(row.clone()))
    }

    async fn set_mode(
        &self,
        id: DbId,
        mode: SessionMode,
    ) -> Result<Option<LiveSession>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        row.session_mode = mode;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn set_controls(
        &self,
        id: DbId,
        flags: &ControlFlags,
    ) -> Result<Option<LiveSession>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(v) = flags.show_participant_tops {
            row.show_participant_tops = v;
        }
        if let Some(v) = flags.show_tops_realtime {
            row.show_tops_realtime = v;
        }
        if let Some(v) = flags.anonymous_mode {
            row.anonymous_mode = v;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn set_position_if_active(&self, id: DbId, position: f64) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let Some(row) = inner.rows.iter_mut().find(|r| r.id == id && r.is_active) else {
            return Ok(false);
        };
        row.audio_position = position;
        row.updated_at = Utc::now();
        inner.position_writes += 1;
        Ok(true)
    }
}
