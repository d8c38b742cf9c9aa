//! Handlers for shared evaluation sessions: lifecycle, control updates, and
//! discovery.
//!
//! Reads are open to anonymous participants; every write pattern-matches
//! the resolved [`Caller`] and requires coach credentials plus ownership of
//! the targeted session.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use tandem_core::error::CoreError;
use tandem_core::session::{self, ControlFlags, SessionMode};
use tandem_core::types::DbId;
use tandem_db::models::live_session::LiveSession;
use tandem_db::repositories::{CallRepo, LiveSessionRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub call_id: DbId,
    #[validate(length(min = 1, max = 120))]
    pub session_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePositionRequest {
    pub position: f64,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub call_id: Option<DbId>,
    /// When set, ignore `call_id` and return the coach's active session
    /// regardless of call.
    #[serde(default)]
    pub all: bool,
}

/// A session enriched with its call's display metadata.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: LiveSession,
    pub call_title: String,
    pub call_duration: Option<f64>,
    pub call_status: Option<String>,
}

// ---------------------------------------------------------------------------
// Lifecycle endpoints (coach-only)
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions
///
/// Start a live-coaching session, evicting any session the coach already
/// has active.
pub async fn start_session(
    caller: Caller,
    State(state): State<AppState>,
    Json(input): Json<StartSessionRequest>,
) -> AppResult<impl IntoResponse> {
    let coach_id = caller.coach_id()?;
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = state
        .live
        .start(coach_id, input.call_id, input.session_name)
        .await?;
    Ok(Json(DataResponse { data: session }))
}

/// POST /api/v1/sessions/{id}/stop
///
/// Soft-close a session. Idempotent.
pub async fn stop_session(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    owned_session(&state, &caller, id).await?;
    let session = state.live.stop(id).await?;
    Ok(Json(DataResponse { data: session }))
}

/// PATCH /api/v1/sessions/{id}/mode
///
/// Change the session mode. Invalid mode strings are rejected before any
/// store write.
pub async fn update_mode(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateModeRequest>,
) -> AppResult<impl IntoResponse> {
    let mode = SessionMode::parse(&input.mode)?;
    owned_session(&state, &caller, id).await?;
    let session = state.live.update_mode(id, mode).await?;
    Ok(Json(DataResponse { data: session }))
}

/// PATCH /api/v1/sessions/{id}/controls
///
/// Partial update of the display-control flags. Unknown keys and non-bool
/// values are silently dropped; a body with nothing recognized is rejected.
pub async fn update_controls(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    let flags = ControlFlags::from_json(&body);
    owned_session(&state, &caller, id).await?;
    let session = state.live.update_controls(id, flags).await?;
    Ok(Json(DataResponse { data: session }))
}

/// PATCH /api/v1/sessions/{id}/position
///
/// Debounced playback-position update, issued continuously during playback.
/// The response carries the current row; the committed position trails by
/// up to one debounce window.
pub async fn update_position(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePositionRequest>,
) -> AppResult<impl IntoResponse> {
    session::validate_position(input.position)?;
    owned_session(&state, &caller, id).await?;
    let session = state.live.update_position(id, input.position).await?;
    Ok(Json(DataResponse { data: session }))
}

// ---------------------------------------------------------------------------
// Discovery endpoints
// ---------------------------------------------------------------------------

/// GET /api/v1/sessions/check?call_id=&all=
///
/// Coach-scoped discovery: `all=true` checks across calls, otherwise
/// `call_id` is required. Coach scoping is mandatory; another coach's
/// session on the same call is invisible here.
pub async fn check_sessions(
    caller: Caller,
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> AppResult<impl IntoResponse> {
    let coach_id = caller.coach_id()?;

    let check = if query.all {
        state.live.check_for_coach(coach_id).await?
    } else {
        let call_id = query.call_id.ok_or_else(|| {
            AppError::Core(CoreError::Validation(
                "call_id is required unless all=true".into(),
            ))
        })?;
        state.live.check_for_call(coach_id, call_id).await?
    };
    Ok(Json(DataResponse { data: check }))
}

/// GET /api/v1/sessions/active
///
/// Global participant-facing list of active sessions across all coaches,
/// enriched with call metadata for session pickers. Deliberately requires
/// no authentication.
pub async fn list_active_sessions(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let rows = LiveSessionRepo::list_active_with_calls(&state.pool).await?;
    let sessions: Vec<SessionView> = rows
        .into_iter()
        .map(|row| {
            let call_title = session::call_title(
                row.call_description.as_deref(),
                row.call_filename.as_deref(),
                row.session.call_id,
            );
            SessionView {
                call_title,
                call_duration: row.call_duration,
                call_status: row.call_status,
                session: row.session,
            }
        })
        .collect();
    Ok(Json(DataResponse { data: sessions }))
}

/// GET /api/v1/sessions/{id}
///
/// Fetch one session (any caller), enriched with call metadata when the
/// call row is present.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let session = state.live.session(id).await?;
    let call = CallRepo::get(&state.pool, session.call_id).await?;

    let (call_title, call_duration, call_status) = match call {
        Some(call) => (call.title(), call.duration_secs, call.status.clone()),
        None => (
            session::call_title(None, None, session.call_id),
            None,
            None,
        ),
    };
    Ok(Json(DataResponse {
        data: SessionView {
            session,
            call_title,
            call_duration,
            call_status,
        },
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the caller to a coach and verify they own the targeted session.
async fn owned_session(state: &AppState, caller: &Caller, id: DbId) -> AppResult<LiveSession> {
    let coach_id = caller.coach_id()?;
    let session = state.live.session(id).await?;
    if session.coach_user_id != coach_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "session belongs to another coach".into(),
        )));
    }
    Ok(session)
}
