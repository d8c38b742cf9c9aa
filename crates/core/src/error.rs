use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A post-write check observed a state the invariants forbid (e.g. more
    /// than one active session for a coach after insert, or a session still
    /// active after stop). Surfaced to the caller, never auto-corrected.
    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
