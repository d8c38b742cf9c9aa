//! Shared-evaluation-session constants, types, and validation.
//!
//! This module lives in `core` (zero internal deps) so that the API layer,
//! the repository layer, and the realtime feed all reference the same mode
//! enum, control-flag filtering, and position validation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Realtime constants
// ---------------------------------------------------------------------------

/// Debounce window for high-frequency playback-position updates, in
/// milliseconds. Multiple updates inside the window collapse into a single
/// store write carrying the last value.
pub const POSITION_DEBOUNCE_MS: u64 = 150;

/// Maximum display length of a call description before truncation.
pub const CALL_TITLE_MAX_LEN: usize = 60;

// ---------------------------------------------------------------------------
// Session mode
// ---------------------------------------------------------------------------

/// Lifecycle mode of a shared evaluation session.
///
/// Stored as lowercase text in the `session_mode` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Actively broadcasting to participants.
    Live,
    Paused,
    Ended,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Live => "live",
            SessionMode::Paused => "paused",
            SessionMode::Ended => "ended",
        }
    }

    /// Parse a client-supplied mode string. Invalid values are rejected
    /// before any store access.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "live" => Ok(SessionMode::Live),
            "paused" => Ok(SessionMode::Paused),
            "ended" => Ok(SessionMode::Ended),
            other => Err(CoreError::Validation(format!(
                "invalid session mode '{other}' (expected live, paused, or ended)"
            ))),
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for SessionMode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SessionMode::parse(&value)
    }
}

// ---------------------------------------------------------------------------
// Display-control flags
// ---------------------------------------------------------------------------

/// Partial update of the coach-mutable display-control flags.
///
/// Built from an untrusted JSON body: only the three recognized boolean keys
/// are picked up, everything else is silently dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub show_participant_tops: Option<bool>,
    pub show_tops_realtime: Option<bool>,
    pub anonymous_mode: Option<bool>,
}

impl ControlFlags {
    /// Extract recognized boolean flags from an arbitrary JSON object.
    ///
    /// Unknown keys and non-boolean values for known keys are ignored. A
    /// non-object body yields an empty update.
    pub fn from_json(body: &serde_json::Value) -> Self {
        let pick = |key: &str| body.get(key).and_then(serde_json::Value::as_bool);
        Self {
            show_participant_tops: pick("show_participant_tops"),
            show_tops_realtime: pick("show_tops_realtime"),
            anonymous_mode: pick("anonymous_mode"),
        }
    }

    /// True when no recognized key survived filtering. Such an update is
    /// rejected before any store access.
    pub fn is_empty(&self) -> bool {
        self.show_participant_tops.is_none()
            && self.show_tops_realtime.is_none()
            && self.anonymous_mode.is_none()
    }
}

// ---------------------------------------------------------------------------
// Position validation
// ---------------------------------------------------------------------------

/// Validate a client-supplied playback position (seconds).
///
/// Positions are client-settable (seek), so the only constraints are that
/// the value is finite and non-negative.
pub fn validate_position(position: f64) -> Result<(), CoreError> {
    if !position.is_finite() {
        return Err(CoreError::Validation(
            "audio position must be a finite number".into(),
        ));
    }
    if position < 0.0 {
        return Err(CoreError::Validation(format!(
            "audio position must be non-negative (got {position})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Call title derivation
// ---------------------------------------------------------------------------

/// Derive a display title for a call: prefer the (truncated) description,
/// else the cleaned filename, else a generated placeholder.
pub fn call_title(description: Option<&str>, filename: Option<&str>, call_id: DbId) -> String {
    if let Some(desc) = description.map(str::trim).filter(|d| !d.is_empty()) {
        return truncate(desc, CALL_TITLE_MAX_LEN);
    }
    if let Some(name) = filename.map(str::trim).filter(|f| !f.is_empty()) {
        return clean_filename(name);
    }
    format!("Call #{call_id}")
}

/// Truncate at a char boundary, appending an ellipsis when shortened.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Strip the extension and replace separator characters with spaces.
fn clean_filename(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem,
        _ => name,
    };
    stem.replace(['_', '-'], " ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_round_trip() {
        for mode in [SessionMode::Live, SessionMode::Paused, SessionMode::Ended] {
            assert_eq!(SessionMode::parse(mode.as_str()).unwrap(), mode);
        }
    }

    #[test]
    fn mode_parse_rejects_unknown_values() {
        for bad in ["fast-forward", "LIVE", "", "stopped"] {
            assert!(SessionMode::parse(bad).is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn control_flags_drop_unknown_and_non_bool_keys() {
        let body = serde_json::json!({
            "show_participant_tops": true,
            "bogus_field": 1,
            "anonymous_mode": "yes",
        });
        let flags = ControlFlags::from_json(&body);
        assert_eq!(flags.show_participant_tops, Some(true));
        assert_eq!(flags.show_tops_realtime, None);
        // Known key with a non-boolean value is dropped, not coerced.
        assert_eq!(flags.anonymous_mode, None);
    }

    #[test]
    fn control_flags_empty_after_filtering() {
        let body = serde_json::json!({ "bogus": true, "other": 3 });
        assert!(ControlFlags::from_json(&body).is_empty());
        assert!(ControlFlags::from_json(&serde_json::json!(42)).is_empty());
    }

    #[test]
    fn position_validation() {
        assert!(validate_position(0.0).is_ok());
        assert!(validate_position(1234.5).is_ok());
        assert!(validate_position(-1.0).is_err());
        assert!(validate_position(f64::NAN).is_err());
        assert!(validate_position(f64::INFINITY).is_err());
    }

    #[test]
    fn call_title_prefers_description() {
        let title = call_title(Some("Quarterly review call"), Some("rec_01.mp3"), 7);
        assert_eq!(title, "Quarterly review call");
    }

    #[test]
    fn call_title_truncates_long_description() {
        let long = "x".repeat(100);
        let title = call_title(Some(&long), None, 7);
        assert!(title.chars().count() <= CALL_TITLE_MAX_LEN + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn call_title_falls_back_to_cleaned_filename() {
        let title = call_title(Some("   "), Some("sales_call-april.mp3"), 7);
        assert_eq!(title, "sales call april");
    }

    #[test]
    fn call_title_generates_placeholder() {
        assert_eq!(call_title(None, None, 42), "Call #42");
        assert_eq!(call_title(Some(""), Some(""), 42), "Call #42");
    }
}
