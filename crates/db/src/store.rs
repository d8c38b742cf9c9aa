//! The [`SessionStore`] seam between the lifecycle manager and the database.
//!
//! The manager is written against this trait rather than a concrete pool so
//! tests can substitute an in-memory store. [`PgSessionStore`] is the
//! production implementation, a thin wrapper over [`LiveSessionRepo`].

use async_trait::async_trait;
use tandem_core::session::{ControlFlags, SessionMode};
use tandem_core::types::DbId;

use crate::models::live_session::{CreateLiveSession, LiveSession};
use crate::repositories::LiveSessionRepo;
use crate::DbPool;

/// Errors surfaced by a session store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Non-sqlx backend failure (used by test doubles and any future
    /// non-Postgres store).
    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the failure is a unique-constraint violation on the
    /// one-active-session-per-coach index.
    pub fn is_active_session_conflict(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
                    && db_err
                        .constraint()
                        .is_some_and(|c| c == "uq_shared_evaluation_sessions_active_coach")
            }
            StoreError::Backend(msg) => msg.contains("uq_shared_evaluation_sessions_active_coach"),
            _ => false,
        }
    }
}

/// Table-like operations over the `shared_evaluation_sessions` table.
///
/// All mutation of session rows goes through these methods; no component
/// writes fields directly.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, input: &CreateLiveSession) -> Result<LiveSession, StoreError>;

    async fn get(&self, id: DbId) -> Result<Option<LiveSession>, StoreError>;

    /// Active sessions for a coach, most recent first.
    async fn active_for_coach(&self, coach_user_id: DbId) -> Result<Vec<LiveSession>, StoreError>;

    async fn active_for_call(
        &self,
        coach_user_id: DbId,
        call_id: DbId,
    ) -> Result<Option<LiveSession>, StoreError>;

    async fn count_active_for_coach(&self, coach_user_id: DbId) -> Result<i64, StoreError>;

    /// Soft-close every active session for a coach; returns the count closed.
    async fn end_all_for_coach(&self, coach_user_id: DbId) -> Result<u64, StoreError>;

    /// Soft-close one session (idempotent). `None` when the id is unknown.
    async fn end(&self, id: DbId) -> Result<Option<LiveSession>, StoreError>;

    async fn set_mode(&self, id: DbId, mode: SessionMode)
        -> Result<Option<LiveSession>, StoreError>;

    async fn set_controls(
        &self,
        id: DbId,
        flags: &ControlFlags,
    ) -> Result<Option<LiveSession>, StoreError>;

    /// Commit a position only if the row is still active; `false` means the
    /// write was skipped (session ended), which callers treat as a no-op.
    async fn set_position_if_active(&self, id: DbId, position: f64) -> Result<bool, StoreError>;
}

/// Production [`SessionStore`] backed by the Postgres pool.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, input: &CreateLiveSession) -> Result<LiveSession, StoreError> {
        Ok(LiveSessionRepo::create(&self.pool, input).await?)
    }

    async fn get(&self, id: DbId) -> Result<Option<LiveSession>, StoreError> {
        Ok(LiveSessionRepo::get(&self.pool, id).await?)
    }

    async fn active_for_coach(&self, coach_user_id: DbId) -> Result<Vec<LiveSession>, StoreError> {
        Ok(LiveSessionRepo::active_for_coach(&self.pool, coach_user_id).await?)
    }

    async fn active_for_call(
        &self,
        coach_user_id: DbId,
        call_id: DbId,
    ) -> Result<Option<LiveSession>, StoreError> {
        Ok(LiveSessionRepo::active_for_call(&self.pool, coach_user_id, call_id).await?)
    }

    async fn count_active_for_coach(&self, coach_user_id: DbId) -> Result<i64, StoreError> {
        Ok(LiveSessionRepo::count_active_for_coach(&self.pool, coach_user_id).await?)
    }

    async fn end_all_for_coach(&self, coach_user_id: DbId) -> Result<u64, StoreError> {
        Ok(LiveSessionRepo::end_all_for_coach(&self.pool, coach_user_id).await?)
    }

    async fn end(&self, id: DbId) -> Result<Option<LiveSession>, StoreError> {
        Ok(LiveSessionRepo::end(&self.pool, id).await?)
    }

    async fn set_mode(
        &self,
        id: DbId,
        mode: SessionMode,
    ) -> Result<Option<LiveSession>, StoreError> {
        Ok(LiveSessionRepo::set_mode(&self.pool, id, mode).await?)
    }

    async fn set_controls(
        &self,
        id: DbId,
        flags: &ControlFlags,
    ) -> Result<Option<LiveSession>, StoreError> {
        Ok(LiveSessionRepo::set_controls(&self.pool, id, flags).await?)
    }

    async fn set_position_if_active(&self, id: DbId, position: f64) -> Result<bool, StoreError> {
        Ok(LiveSessionRepo::set_position_if_active(&self.pool, id, position).await?)
    }
}
