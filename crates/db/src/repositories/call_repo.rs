//! Repository for the `calls` table (read-only display metadata).

use sqlx::PgPool;
use tandem_core::types::DbId;

use crate::models::call::Call;

pub struct CallRepo;

impl CallRepo {
    /// Fetch a single call by id.
    pub async fn get(pool: &PgPool, call_id: DbId) -> Result<Option<Call>, sqlx::Error> {
        sqlx::query_as::<_, Call>(
            "SELECT callid, filename, description, duree, status
             FROM calls WHERE callid = $1",
        )
        .bind(call_id)
        .fetch_optional(pool)
        .await
    }
}
