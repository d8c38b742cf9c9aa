//! Repository for the `shared_evaluation_sessions` table.
//!
//! Every mutation stamps `updated_at`. Nothing here enforces the one-active-
//! session-per-coach invariant on its own; that is the lifecycle manager's
//! job (backed by the partial unique index in the migration).

use sqlx::PgPool;
use tandem_core::session::{ControlFlags, SessionMode};
use tandem_core::types::DbId;

use crate::models::live_session::{ActiveSessionWithCall, CreateLiveSession, LiveSession};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, coach_user_id, call_id, session_name, session_mode, is_active, \
                       audio_position, show_participant_tops, show_tops_realtime, \
                       anonymous_mode, created_at, updated_at";

/// Provides CRUD operations for shared evaluation sessions.
pub struct LiveSessionRepo;

impl LiveSessionRepo {
    /// Insert a new session, returning the created row.
    ///
    /// New rows are always `is_active = true, session_mode = 'paused',
    /// audio_position = 0`. Inserting while the coach already has an active
    /// row violates `uq_shared_evaluation_sessions_active_coach`.
    pub async fn create(
        pool: &PgPool,
        input: &CreateLiveSession,
    ) -> Result<LiveSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO shared_evaluation_sessions
                 (coach_user_id, call_id, session_name, session_mode, is_active, audio_position)
             VALUES ($1, $2, $3, 'paused', true, 0)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(input.coach_user_id)
            .bind(input.call_id)
            .bind(&input.session_name)
            .fetch_one(pool)
            .await
    }

    /// Fetch a single session by id.
    pub async fn get(pool: &PgPool, id: DbId) -> Result<Option<LiveSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM shared_evaluation_sessions WHERE id = $1");
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All active sessions for a coach, most recent first.
    ///
    /// Under correct operation this returns at most one row; callers that
    /// observe more report the count rather than repairing.
    pub async fn active_for_coach(
        pool: &PgPool,
        coach_user_id: DbId,
    ) -> Result<Vec<LiveSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM shared_evaluation_sessions
             WHERE coach_user_id = $1 AND is_active = true
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(coach_user_id)
            .fetch_all(pool)
            .await
    }

    /// The coach's active session on a specific call, if any.
    pub async fn active_for_call(
        pool: &PgPool,
        coach_user_id: DbId,
        call_id: DbId,
    ) -> Result<Option<LiveSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM shared_evaluation_sessions
             WHERE coach_user_id = $1 AND call_id = $2 AND is_active = true
             ORDER BY created_at DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(coach_user_id)
            .bind(call_id)
            .fetch_optional(pool)
            .await
    }

    /// Count the coach's active sessions (post-write verification).
    pub async fn count_active_for_coach(
        pool: &PgPool,
        coach_user_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM shared_evaluation_sessions
             WHERE coach_user_id = $1 AND is_active = true",
        )
        .bind(coach_user_id)
        .fetch_one(pool)
        .await
    }

    /// Soft-close every active session for a coach (eviction on start).
    /// Returns the number of rows closed.
    pub async fn end_all_for_coach(
        pool: &PgPool,
        coach_user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE shared_evaluation_sessions
             SET is_active = false, session_mode = 'ended', updated_at = NOW()
             WHERE coach_user_id = $1 AND is_active = true",
        )
        .bind(coach_user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Soft-close one session. Idempotent: closing an already-ended session
    /// rewrites the same terminal state and succeeds.
    pub async fn end(pool: &PgPool, id: DbId) -> Result<Option<LiveSession>, sqlx::Error> {
        let query = format!(
            "UPDATE shared_evaluation_sessions
             SET is_active = false, session_mode = 'ended', updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update the session mode. Does not touch `is_active`.
    pub async fn set_mode(
        pool: &PgPool,
        id: DbId,
        mode: SessionMode,
    ) -> Result<Option<LiveSession>, sqlx::Error> {
        let query = format!(
            "UPDATE shared_evaluation_sessions
             SET session_mode = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(id)
            .bind(mode.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Partial update of the display-control flags: absent flags keep their
    /// current value.
    pub async fn set_controls(
        pool: &PgPool,
        id: DbId,
        flags: &ControlFlags,
    ) -> Result<Option<LiveSession>, sqlx::Error> {
        let query = format!(
            "UPDATE shared_evaluation_sessions
             SET show_participant_tops = COALESCE($2, show_participant_tops),
                 show_tops_realtime    = COALESCE($3, show_tops_realtime),
                 anonymous_mode        = COALESCE($4, anonymous_mode),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LiveSession>(&query)
            .bind(id)
            .bind(flags.show_participant_tops)
            .bind(flags.show_tops_realtime)
            .bind(flags.anonymous_mode)
            .fetch_optional(pool)
            .await
    }

    /// Commit a playback position, conditioned on the session still being
    /// active. Returns `false` (a no-op, not an error) when the session has
    /// been stopped, so a stale debounced write after stop is harmless.
    pub async fn set_position_if_active(
        pool: &PgPool,
        id: DbId,
        position: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE shared_evaluation_sessions
             SET audio_position = $2, updated_at = NOW()
             WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .bind(position)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All active sessions across all coaches, joined with call metadata for
    /// participant-facing session pickers.
    pub async fn list_active_with_calls(
        pool: &PgPool,
    ) -> Result<Vec<ActiveSessionWithCall>, sqlx::Error> {
        let query = format!(
            "SELECT {prefixed}, c.filename AS call_filename, c.description AS call_description, \
                    c.duree AS call_duration, c.status AS call_status
             FROM shared_evaluation_sessions s
             LEFT JOIN calls c ON c.callid = s.call_id
             WHERE s.is_active = true
             ORDER BY s.created_at DESC",
            prefixed = COLUMNS
                .split(", ")
                .map(|col| format!("s.{col}"))
                .collect::<Vec<_>>()
                .join(", "),
        );
        sqlx::query_as::<_, ActiveSessionWithCall>(&query)
            .fetch_all(pool)
            .await
    }
}
