//! Call metadata model (read-only from this backend's perspective).

use serde::Serialize;
use sqlx::FromRow;
use tandem_core::types::DbId;

/// A call recording row from the `calls` table.
///
/// Column names (`callid`, `duree`) are owned by the ingestion service and
/// mapped to friendlier field names here.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Call {
    #[sqlx(rename = "callid")]
    pub id: DbId,
    pub filename: Option<String>,
    pub description: Option<String>,
    #[sqlx(rename = "duree")]
    pub duration_secs: Option<f64>,
    pub status: Option<String>,
}

impl Call {
    /// Display title: truncated description, else cleaned filename, else a
    /// generated placeholder.
    pub fn title(&self) -> String {
        tandem_core::session::call_title(
            self.description.as_deref(),
            self.filename.as_deref(),
            self.id,
        )
    }
}
