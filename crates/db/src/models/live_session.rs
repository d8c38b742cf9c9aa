//! Shared evaluation session model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use tandem_core::session::SessionMode;
use tandem_core::types::{DbId, Timestamp};

/// A session row from the `shared_evaluation_sessions` table.
///
/// Invariant enforced by the lifecycle manager (and the partial unique
/// index): for any `coach_user_id`, at most one row has `is_active = true`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LiveSession {
    pub id: DbId,
    pub coach_user_id: DbId,
    pub call_id: DbId,
    pub session_name: String,
    #[sqlx(try_from = "String")]
    pub session_mode: SessionMode,
    pub is_active: bool,
    pub audio_position: f64,
    pub show_participant_tops: bool,
    pub show_tops_realtime: bool,
    pub anonymous_mode: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new session.
///
/// New sessions always start active, paused, at position zero; those values
/// are fixed by the insert, not caller-settable.
#[derive(Debug, Clone)]
pub struct CreateLiveSession {
    pub coach_user_id: DbId,
    pub call_id: DbId,
    pub session_name: String,
}

/// An active session joined with its call's display metadata.
#[derive(Debug, Clone, FromRow)]
pub struct ActiveSessionWithCall {
    #[sqlx(flatten)]
    pub session: LiveSession,
    pub call_filename: Option<String>,
    pub call_description: Option<String>,
    pub call_duration: Option<f64>,
    pub call_status: Option<String>,
}
