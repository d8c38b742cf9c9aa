//! Per-request caller resolution: authenticated coach or anonymous
//! participant.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tandem_core::error::CoreError;
use tandem_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// The resolved privilege of an inbound request.
///
/// A valid bearer token resolves to [`Caller::Coach`]; a missing or invalid
/// token silently downgrades to [`Caller::Participant`] instead of failing
/// the request, so anonymous viewers can read the session and call state a
/// live view needs. Every mutating handler must pattern-match on this (via
/// [`coach_id`](Caller::coach_id)) before writing -- the fallback path never
/// implies write access.
///
/// Resolved per request; validation results are never cached.
#[derive(Debug, Clone)]
pub enum Caller {
    Coach { user_id: DbId },
    Participant,
}

impl Caller {
    /// The coach's id, or an Unauthorized error for participants. Call this
    /// at the top of every coach-gated write handler.
    pub fn coach_id(&self) -> Result<DbId, AppError> {
        match self {
            Caller::Coach { user_id } => Ok(*user_id),
            Caller::Participant => Err(AppError::Core(CoreError::Unauthorized(
                "This action requires coach credentials".into(),
            ))),
        }
    }

    pub fn is_coach(&self) -> bool {
        matches!(self, Caller::Coach { .. })
    }
}

impl FromRequestParts<AppState> for Caller {
    // Extraction never rejects: absent or invalid credentials downgrade.
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let Some(token) = token else {
            return Ok(Caller::Participant);
        };

        match validate_token(token, &state.config.jwt) {
            Ok(claims) => Ok(Caller::Coach {
                user_id: claims.sub,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token rejected, downgrading to participant");
                Ok(Caller::Participant)
            }
        }
    }
}
